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

// Filesystem object storage: <base_path>/<bucket>/<key>

use super::backend::ObjectStorage;
use crate::config::FilesystemConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub struct FilesystemStorage {
    bucket_path: PathBuf,
    bucket_name: String,
}

impl FilesystemStorage {
    pub fn new(config: FilesystemConfig, bucket_name: &str) -> Result<Self> {
        let bucket_path = PathBuf::from(&config.base_path).join(bucket_name);

        info!(
            "Initializing filesystem storage at: {}",
            bucket_path.display()
        );

        Ok(Self {
            bucket_path,
            bucket_name: bucket_name.to_string(),
        })
    }

    /// Resolve `key` inside the bucket directory
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Invalid object key '{}'", key);
        }
        Ok(self.bucket_path.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for FilesystemStorage {
    async fn initialize(&self) -> Result<()> {
        if fs::metadata(&self.bucket_path).await.is_ok() {
            info!("Bucket directory already exists: {}", self.bucket_path.display());
            return Ok(());
        }
        info!("Creating bucket directory: {}", self.bucket_path.display());
        fs::create_dir_all(&self.bucket_path)
            .await
            .context("Failed to create bucket directory")
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }

        // Copy to a sibling and rename so readers never see a partial object
        let partial = target.with_extension("partial");
        let bytes = fs::copy(path, &partial)
            .await
            .context(format!("Failed to copy {} to {}", path.display(), partial.display()))?;
        fs::rename(&partial, &target)
            .await
            .context(format!("Failed to move object into place: {}", target.display()))?;

        debug!("Stored {} bytes at {}", bytes, target.display());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        match fs::metadata(&self.bucket_path).await {
            Ok(metadata) if metadata.is_dir() => {
                let probe = self.bucket_path.join(".health_check_test");
                match fs::File::create(&probe).await {
                    Ok(mut f) => {
                        if let Err(e) = f.write_all(b"test").await {
                            warn!("Health check failed - cannot write: {}", e);
                            return Ok(false);
                        }
                        let _ = fs::remove_file(&probe).await;
                        Ok(true)
                    }
                    Err(e) => {
                        warn!("Health check failed - cannot create file: {}", e);
                        Ok(false)
                    }
                }
            }
            Ok(_) => {
                warn!(
                    "Health check failed - bucket path is not a directory: {}",
                    self.bucket_path.display()
                );
                Ok(false)
            }
            Err(e) => {
                warn!(
                    "Health check failed - cannot access {}: {}",
                    self.bucket_path.display(),
                    e
                );
                Ok(false)
            }
        }
    }

    fn backend_type(&self) -> &str {
        "filesystem"
    }

    fn bucket(&self) -> &str {
        &self.bucket_name
    }
}
