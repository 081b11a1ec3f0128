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

// Storage factory for creating object storage from configuration

use super::backend::ObjectStorage;
use super::filesystem::FilesystemStorage;
use super::s3::S3Storage;
use crate::config::StorageConfig;
use anyhow::{bail, Result};
use std::sync::Arc;

pub struct StorageFactory;

impl StorageFactory {
    pub fn create(config: &StorageConfig) -> Result<Arc<dyn ObjectStorage>> {
        match config.backend.as_str() {
            "s3" => {
                let s3 = config
                    .s3
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("S3 config missing"))?;
                Ok(Arc::new(S3Storage::new(s3, &config.bucket_name)?))
            }

            "filesystem" => {
                let filesystem = config
                    .filesystem
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("Filesystem config missing"))?;
                Ok(Arc::new(FilesystemStorage::new(filesystem, &config.bucket_name)?))
            }

            unknown => bail!(
                "Unknown storage backend: '{}'. Supported: s3, filesystem",
                unknown
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilesystemConfig, S3Config};

    #[tokio::test]
    async fn test_create_s3_storage() {
        let config = StorageConfig::default();
        let storage = StorageFactory::create(&config).unwrap();
        assert_eq!(storage.backend_type(), "s3");
        assert_eq!(storage.bucket(), "neuro-lab");
    }

    #[test]
    fn test_create_filesystem_storage() {
        let config = StorageConfig {
            backend: "filesystem".to_string(),
            bucket_name: "exports".to_string(),
            s3: None,
            filesystem: Some(FilesystemConfig::default()),
        };
        let storage = StorageFactory::create(&config).unwrap();
        assert_eq!(storage.backend_type(), "filesystem");
        assert_eq!(storage.bucket(), "exports");
    }

    #[test]
    fn test_missing_section() {
        let config = StorageConfig {
            backend: "filesystem".to_string(),
            bucket_name: "exports".to_string(),
            s3: Some(S3Config::default()),
            filesystem: None,
        };
        let err = StorageFactory::create(&config).err().unwrap();
        assert!(err.to_string().contains("Filesystem config missing"));
    }

    #[test]
    fn test_create_unknown_backend() {
        let config = StorageConfig {
            backend: "gcs".to_string(),
            ..StorageConfig::default()
        };
        let err = StorageFactory::create(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown storage backend"));
    }
}
