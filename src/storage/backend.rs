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

// Object storage trait for exported files

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Destination for finished export files
///
/// Objects are addressed by a slash-separated key inside the configured
/// bucket. Uploading to an existing key replaces the object.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Create the bucket if needed; succeeds when it already exists
    async fn initialize(&self) -> Result<()>;

    /// Upload the local file at `path` under `key`
    async fn put_file(&self, key: &str, path: &Path) -> Result<()>;

    async fn health_check(&self) -> Result<bool>;

    fn backend_type(&self) -> &str;

    fn bucket(&self) -> &str;
}
