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

// S3-compatible object storage (MinIO and friends)

use super::backend::ObjectStorage;
use crate::config::S3Config;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use std::path::Path;
use tracing::{debug, info, warn};

const DEFAULT_REGION: &str = "us-east-1";

pub struct S3Storage {
    client: Client,
    bucket_name: String,
    region: String,
    endpoint: String,
}

impl S3Storage {
    pub fn new(config: S3Config, bucket_name: &str) -> Result<Self> {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(&config.endpoint)
            .force_path_style(config.force_path_style)
            .build();

        info!(
            "S3 storage at {} (bucket '{}', path-style: {})",
            config.endpoint, bucket_name, config.force_path_style
        );

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket_name: bucket_name.to_string(),
            region: config.region,
            endpoint: config.endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn bucket_exists(&self) -> bool {
        self.client
            .head_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .is_ok()
    }

    /// Create the bucket; an error is fine as long as the bucket is there afterwards
    async fn ensure_bucket(&self) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(&self.bucket_name);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!("Bucket '{}' created successfully", self.bucket_name);
                Ok(())
            }
            Err(e) => {
                if self.bucket_exists().await {
                    info!("Bucket '{}' already exists", self.bucket_name);
                    Ok(())
                } else {
                    Err(anyhow!(
                        "Failed to create bucket '{}': {}",
                        self.bucket_name,
                        DisplayErrorContext(&e)
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn initialize(&self) -> Result<()> {
        self.ensure_bucket().await
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .context(format!("Failed to open {}", path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type("application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to upload '{}': {}", key, DisplayErrorContext(&e)))?;

        debug!("Uploaded {} to s3://{}/{}", path.display(), self.bucket_name, key);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let healthy = self.bucket_exists().await;
        if !healthy {
            warn!("Health check failed - bucket '{}' not reachable", self.bucket_name);
        }
        Ok(healthy)
    }

    fn backend_type(&self) -> &str {
        "s3"
    }

    fn bucket(&self) -> &str {
        &self.bucket_name
    }
}
