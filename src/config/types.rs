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

// Configuration types for sensor-pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub zenoh: ZenohConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub transformer: TransformerSettings,
    #[serde(default)]
    pub exporter: ExporterSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Zenoh configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZenohConfig {
    #[serde(default = "default_mode")]
    pub mode: String,  // "peer", "client", or "router"

    #[serde(default)]
    pub connect: Option<ConnectConfig>,

    #[serde(default)]
    pub listen: Option<ListenConfig>,
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            connect: Some(ConnectConfig {
                endpoints: vec!["tcp/localhost:7447".to_string()],
            }),
            listen: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectConfig {
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    pub endpoints: Vec<String>,
}

/// Durable log (Kafka) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    #[serde(default = "default_brokers")]
    pub brokers: String,

    #[serde(default = "default_raw_topic")]
    pub raw_topic: String,

    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,

    #[serde(default = "default_transformer_group")]
    pub transformer_group: String,

    #[serde(default = "default_exporter_group")]
    pub exporter_group: String,

    /// Write deadline for a single publish
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_ms: u64,

    #[serde(default = "default_offset_reset")]
    pub auto_offset_reset: String,  // "earliest", "latest"
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            raw_topic: default_raw_topic(),
            notification_topic: default_notification_topic(),
            transformer_group: default_transformer_group(),
            exporter_group: default_exporter_group(),
            publish_timeout_ms: default_publish_timeout(),
            auto_offset_reset: default_offset_reset(),
        }
    }
}

impl KafkaConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// Scenario validation endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationConfig {
    #[serde(default = "default_validation_url")]
    pub base_url: String,

    #[serde(default = "default_validation_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            base_url: default_validation_url(),
            timeout_seconds: default_validation_timeout(),
        }
    }
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default = "default_db_user")]
    pub password: String,
    #[serde(default = "default_pool_size")]
    pub max_pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            name: default_db_name(),
            user: default_db_user(),
            password: default_db_user(),
            max_pool_size: default_pool_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewaySettings {
    /// Key expression matching the per-device raw topics
    #[serde(default = "default_raw_key_expr")]
    pub raw_key_expr: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            raw_key_expr: default_raw_key_expr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformerSettings {
    /// Spacing between consecutive samples of one channel.
    ///
    /// 50 samples every 80ms is 625 Hz, i.e. 1.6ms, rounded to 2ms.
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
}

impl Default for TransformerSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterSettings {
    /// Local directory used to stage files before upload
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Queryable prefix for synchronous export requests
    #[serde(default = "default_request_prefix")]
    pub request_key_prefix: String,

    #[serde(default)]
    pub compression: CompressionConfig,
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            request_key_prefix: default_request_prefix(),
            compression: CompressionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompressionConfig {
    pub r#type: String,  // "none", "snappy", "zstd"
    pub level: u8,       // 0-4
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            r#type: "zstd".to_string(),
            level: 2,
        }
    }
}

/// Object storage configuration with backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Backend type: "s3", "filesystem"
    pub backend: String,

    #[serde(default = "default_bucket")]
    pub bucket_name: String,

    #[serde(default)]
    pub s3: Option<S3Config>,

    #[serde(default)]
    pub filesystem: Option<FilesystemConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "s3".to_string(),
            bucket_name: default_bucket(),
            s3: Some(S3Config::default()),
            filesystem: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3Config {
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default = "default_path_style")]
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            region: default_region(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            force_path_style: default_path_style(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesystemConfig {
    pub base_path: String,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            base_path: "/data/exports".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,  // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String,  // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_mode() -> String { "peer".to_string() }
fn default_brokers() -> String { "localhost:19092".to_string() }
fn default_raw_topic() -> String { "gateway.raw".to_string() }
fn default_notification_topic() -> String { "export.notification".to_string() }
fn default_transformer_group() -> String { "transformer-group".to_string() }
fn default_exporter_group() -> String { "exporter-group".to_string() }
fn default_publish_timeout() -> u64 { 1000 }
fn default_offset_reset() -> String { "earliest".to_string() }
fn default_validation_url() -> String { "http://localhost:3002/api/v1".to_string() }
fn default_validation_timeout() -> u64 { 10 }
fn default_db_host() -> String { "localhost".to_string() }
fn default_db_port() -> u16 { 5432 }
fn default_db_name() -> String { "timescaledb".to_string() }
fn default_db_user() -> String { "timescaledb".to_string() }
fn default_pool_size() -> usize { 8 }
fn default_raw_key_expr() -> String { "device/*/raw".to_string() }
fn default_sample_interval() -> u64 { 2 }
fn default_work_dir() -> String { "./exports".to_string() }
fn default_request_prefix() -> String { "export/request".to_string() }
fn default_bucket() -> String { "neuro-lab".to_string() }
fn default_region() -> String { "us-east-1".to_string() }
fn default_path_style() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
