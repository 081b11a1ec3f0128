// Configuration module for sensor-pipeline
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - Configuration validation
// - Default values

pub mod types;
mod loader;

pub use types::*;
pub use loader::ConfigLoader;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load configuration with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Allow environment variables to override config values
pub fn apply_env_overrides(config: &mut PipelineConfig) {
    if let Ok(brokers) = std::env::var("KAFKA_BROKERS") {
        config.kafka.brokers = brokers;
    }

    if let Ok(url) = std::env::var("VALIDATION_URL") {
        config.validation.base_url = url;
    }

    if let Ok(host) = std::env::var("DATABASE_HOST") {
        config.database.host = host;
    }

    if let Ok(password) = std::env::var("DATABASE_PASSWORD") {
        config.database.password = password;
    }

    if let Some(s3) = config.storage.s3.as_mut() {
        if let Ok(endpoint) = std::env::var("S3_ENDPOINT") {
            s3.endpoint = endpoint;
        }
        if let Ok(access_key) = std::env::var("S3_ACCESS_KEY") {
            s3.access_key = access_key;
        }
        if let Ok(secret_key) = std::env::var("S3_SECRET_KEY") {
            s3.secret_key = secret_key;
        }
    }
}
