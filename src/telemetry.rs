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

// Logging setup and the in-process instruments recorded by each stage

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};
use tracing::Level;

use crate::config::LoggingConfig;

const MS_BUCKETS: [f64; 10] = [1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

/// Install the global tracing subscriber
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let log_level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = tracing_subscriber::fmt().with_max_level(log_level);
    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

/// Counters and histograms for all three stages, registered on one registry
pub struct PipelineMetrics {
    registry: Registry,

    pub gateway_messages_received: IntCounter,
    pub gateway_duration_ms: Histogram,
    pub gateway_validation_duration_ms: Histogram,
    pub gateway_frames: IntCounterVec,

    pub transformer_processing_seconds: HistogramVec,
    pub transformer_store_write_seconds: HistogramVec,
    pub transformer_events_processed: IntCounterVec,

    pub exporter_exports: IntCounterVec,
    pub exporter_duration_seconds: HistogramVec,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let gateway_messages_received = IntCounter::new(
            "gateway_messages_received_total",
            "Number of raw device messages received",
        )?;
        let gateway_duration_ms = Histogram::with_opts(
            HistogramOpts::new("gateway_duration_ms", "Duration of gateway processing in ms")
                .buckets(MS_BUCKETS.to_vec()),
        )?;
        let gateway_validation_duration_ms = Histogram::with_opts(
            HistogramOpts::new(
                "gateway_validation_duration_ms",
                "Duration of scenario validation calls in ms",
            )
            .buckets(MS_BUCKETS.to_vec()),
        )?;
        let gateway_frames = IntCounterVec::new(
            Opts::new("gateway_frames_total", "Frames handled by the gateway by outcome"),
            &["status"],
        )?;

        let transformer_processing_seconds = HistogramVec::new(
            HistogramOpts::new(
                "transformer_processing_duration_seconds",
                "Duration of durable log event processing in seconds",
            ),
            &["topic", "status"],
        )?;
        let transformer_store_write_seconds = HistogramVec::new(
            HistogramOpts::new(
                "transformer_store_write_duration_seconds",
                "Duration of the bulk sample insert in seconds",
            ),
            &["topic", "status"],
        )?;
        let transformer_events_processed = IntCounterVec::new(
            Opts::new(
                "transformer_events_processed_total",
                "Total number of durable log events processed",
            ),
            &["topic", "status"],
        )?;

        let exporter_exports = IntCounterVec::new(
            Opts::new("exporter_exports_total", "Exports attempted by trigger and outcome"),
            &["trigger", "status"],
        )?;
        let exporter_duration_seconds = HistogramVec::new(
            HistogramOpts::new("exporter_duration_seconds", "Duration of one export in seconds"),
            &["trigger", "status"],
        )?;

        registry.register(Box::new(gateway_messages_received.clone()))?;
        registry.register(Box::new(gateway_duration_ms.clone()))?;
        registry.register(Box::new(gateway_validation_duration_ms.clone()))?;
        registry.register(Box::new(gateway_frames.clone()))?;
        registry.register(Box::new(transformer_processing_seconds.clone()))?;
        registry.register(Box::new(transformer_store_write_seconds.clone()))?;
        registry.register(Box::new(transformer_events_processed.clone()))?;
        registry.register(Box::new(exporter_exports.clone()))?;
        registry.register(Box::new(exporter_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            gateway_messages_received,
            gateway_duration_ms,
            gateway_validation_duration_ms,
            gateway_frames,
            transformer_processing_seconds,
            transformer_store_write_seconds,
            transformer_events_processed,
            exporter_exports,
            exporter_duration_seconds,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruments_registered_once() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.gateway_messages_received.inc();
        metrics
            .transformer_events_processed
            .with_label_values(&["gateway.raw", "success"])
            .inc();

        let families = metrics.registry().gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"gateway_messages_received_total"));
        assert!(names.contains(&"transformer_events_processed_total"));
    }

    #[test]
    fn test_independent_registries() {
        // Each stage owns its registry, so two instances never collide
        assert!(PipelineMetrics::new().is_ok());
        assert!(PipelineMetrics::new().is_ok());
    }
}
