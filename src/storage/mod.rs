// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Object storage module
//
// Finished export files are uploaded through the ObjectStorage trait,
// either to an S3-compatible service or to a local directory tree.

pub mod backend;
pub mod factory;
pub mod filesystem;
pub mod s3;

pub use backend::ObjectStorage;
pub use factory::StorageFactory;
pub use filesystem::FilesystemStorage;
pub use s3::S3Storage;
