// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;

/// Upper bound for the sample interval, one minute
pub const MAX_SAMPLE_INTERVAL_MS: u64 = 60_000;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_yaml(content: &str) -> Result<PipelineConfig> {
        let content = Self::substitute_env_vars(content);

        let config: PipelineConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${KAFKA_BROKERS:-localhost:19092} -> localhost:19092 (if KAFKA_BROKERS not set)
    fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}").unwrap();

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        // Keep original if no default and var not found
                        format!("${{{}}}", var_name)
                    }
                }
            }
        }).to_string()
    }

    /// Validate configuration
    pub(crate) fn validate(config: &PipelineConfig) -> Result<()> {
        if config.kafka.brokers.trim().is_empty() {
            bail!("kafka.brokers cannot be empty");
        }

        for (name, value) in [
            ("kafka.raw_topic", &config.kafka.raw_topic),
            ("kafka.notification_topic", &config.kafka.notification_topic),
            ("kafka.transformer_group", &config.kafka.transformer_group),
            ("kafka.exporter_group", &config.kafka.exporter_group),
        ] {
            if value.is_empty() {
                bail!("{} cannot be empty", name);
            }
        }

        if config.kafka.publish_timeout_ms == 0 {
            bail!("kafka.publish_timeout_ms must be > 0");
        }

        match config.kafka.auto_offset_reset.as_str() {
            "earliest" | "latest" => {}
            other => bail!("kafka.auto_offset_reset must be earliest or latest, got '{}'", other),
        }

        if config.transformer.sample_interval_ms == 0
            || config.transformer.sample_interval_ms > MAX_SAMPLE_INTERVAL_MS
        {
            bail!(
                "transformer.sample_interval_ms must be between 1 and {}",
                MAX_SAMPLE_INTERVAL_MS
            );
        }

        if config.database.max_pool_size == 0 {
            bail!("database.max_pool_size must be > 0");
        }

        if config.gateway.raw_key_expr.is_empty() {
            bail!("gateway.raw_key_expr cannot be empty");
        }

        match config.exporter.compression.r#type.as_str() {
            "none" | "snappy" | "zstd" => {}
            unknown => bail!("Unknown compression type: '{}'. Supported: none, snappy, zstd", unknown),
        }

        if config.exporter.compression.level > 4 {
            bail!("exporter.compression.level must be 0-4");
        }

        if config.storage.bucket_name.is_empty() {
            bail!("storage.bucket_name cannot be empty");
        }

        match config.storage.backend.as_str() {
            "s3" => {
                if config.storage.s3.is_none() {
                    bail!("s3 backend selected but s3 config missing");
                }
            }
            "filesystem" => {
                if config.storage.filesystem.is_none() {
                    bail!("filesystem backend selected but filesystem config missing");
                }
            }
            unknown => bail!("Unknown backend: '{}'. Supported: s3, filesystem", unknown),
        }

        Ok(())
    }
}
