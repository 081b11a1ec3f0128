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

//! Stream transformer: wide envelopes from the durable log into long-format rows
//!
//! Every (channel, sample index) pair of an envelope becomes one
//! [`ProcessedSample`]. Sample timestamps are reconstructed from the batch
//! timestamp and a fixed sample interval, so processing the same envelope
//! twice yields identical rows.
//!
//! # Failure handling
//!
//! - Undecodable envelopes are logged and skipped
//! - A store failure drops the whole frame's batch and processing moves on
//! - An offset store failure (e.g. a partition revoked by a rebalance) is
//!   logged and consumption continues
//! - A consume failure ends the loop

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::durable_log::{LogRecord, LogSource};
use crate::error::{PipelineError, PipelineResult};
use crate::protocol::{parse_batch_timestamp, SensorEnvelope};
use crate::store::{ProcessedSample, SampleStore};
use crate::telemetry::PipelineMetrics;

/// Absolute time of sample `index` in a batch starting at `batch_start`
///
/// `None` when the offset leaves chrono's representable range.
pub fn sample_timestamp(
    batch_start: DateTime<Utc>,
    index: usize,
    interval_ms: u64,
) -> Option<DateTime<Utc>> {
    let offset_ms = i64::try_from(index)
        .ok()?
        .checked_mul(i64::try_from(interval_ms).ok()?)?;
    batch_start.checked_add_signed(Duration::try_milliseconds(offset_ms)?)
}

/// Explode one envelope into one row per (channel, index)
pub fn explode(envelope: &SensorEnvelope, interval_ms: u64) -> PipelineResult<Vec<ProcessedSample>> {
    let batch_start = parse_batch_timestamp(&envelope.timestamp).ok_or_else(|| {
        PipelineError::Malformed(format!("unparsable batch timestamp '{}'", envelope.timestamp))
    })?;

    let mut samples = Vec::with_capacity(envelope.sample_count());
    for channel in &envelope.data {
        for (index, value) in channel.values.iter().enumerate() {
            samples.push(ProcessedSample {
                device_id: envelope.device_id,
                scenario_id: envelope.scenario_id,
                frame_id: envelope.frame_id,
                metric_name: channel.channel_name.clone(),
                value: *value,
                timestamp: sample_timestamp(batch_start, index, interval_ms).ok_or_else(|| {
                    PipelineError::Malformed(format!(
                        "sample {} of '{}' overflows the timestamp range",
                        index, channel.channel_name
                    ))
                })?,
            });
        }
    }

    Ok(samples)
}

pub struct StreamTransformer {
    store: Arc<dyn SampleStore>,
    metrics: Arc<PipelineMetrics>,
    sample_interval_ms: u64,
}

impl StreamTransformer {
    pub fn new(store: Arc<dyn SampleStore>, metrics: Arc<PipelineMetrics>, sample_interval_ms: u64) -> Self {
        Self {
            store,
            metrics,
            sample_interval_ms,
        }
    }

    /// Decode, explode and persist one record; returns the number of rows written
    pub async fn handle_record(&self, record: &LogRecord) -> PipelineResult<u64> {
        let start = Instant::now();
        let result = self.process(record).await;

        let status = match &result {
            Ok(_) => "success",
            Err(PipelineError::Malformed(_)) => "malformed",
            Err(_) => "store_error",
        };
        self.metrics
            .transformer_processing_seconds
            .with_label_values(&[record.topic.as_str(), status])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .transformer_events_processed
            .with_label_values(&[record.topic.as_str(), status])
            .inc();

        result
    }

    async fn process(&self, record: &LogRecord) -> PipelineResult<u64> {
        let envelope: SensorEnvelope = serde_json::from_slice(&record.payload)
            .map_err(|e| PipelineError::Malformed(e.to_string()))?;

        let samples = explode(&envelope, self.sample_interval_ms)?;

        let write_start = Instant::now();
        let written = self.store.insert_batch(&samples).await;
        let status = if written.is_ok() { "success" } else { "error" };
        self.metrics
            .transformer_store_write_seconds
            .with_label_values(&[record.topic.as_str(), status])
            .observe(write_start.elapsed().as_secs_f64());

        let written = written?;
        debug!(
            "Frame {} (device {}, scenario {}): stored {} samples",
            envelope.frame_id, envelope.device_id, envelope.scenario_id, written
        );
        Ok(written)
    }

    /// Consume until the source is exhausted or fails
    pub async fn run(&self, source: &mut dyn LogSource) -> PipelineResult<()> {
        info!("Transformer consuming, sample interval {}ms", self.sample_interval_ms);

        loop {
            let record = match source.next_record().await {
                Ok(Some(record)) => record,
                Ok(None) => return Ok(()),
                Err(e) => {
                    error!("Could not read message: {}", e);
                    return Err(e);
                }
            };

            match self.handle_record(&record).await {
                Ok(_) => {}
                Err(PipelineError::Malformed(reason)) => {
                    warn!(
                        "Skipping undecodable message {}/{}@{}: {}",
                        record.topic, record.partition, record.offset, reason
                    );
                }
                Err(e) => {
                    error!(
                        "Could not store samples from {}/{}@{}: {}",
                        record.topic, record.partition, record.offset, e
                    );
                }
            }

            // Failed records are not requeued
            if let Err(e) = source.ack(&record).await {
                warn!(
                    "Could not store offset for {}/{}@{}: {}",
                    record.topic, record.partition, record.offset, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable_log::MemoryLog;
    use crate::protocol::{format_batch_timestamp, ChannelData};
    use crate::store::MemorySampleStore;
    use chrono::TimeZone;

    fn envelope(channels: Vec<(&str, Vec<f64>)>) -> SensorEnvelope {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        SensorEnvelope {
            data: channels
                .into_iter()
                .map(|(name, values)| ChannelData {
                    channel_name: name.to_string(),
                    values,
                })
                .collect(),
            device_id: 7,
            scenario_id: 19,
            timestamp: format_batch_timestamp(start),
            frame_id: 1,
        }
    }

    #[test]
    fn test_explode_example_frame() {
        let env = envelope(vec![("acc_x", vec![1.0, 2.0]), ("gyro_z", vec![3.0, 4.0])]);
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();

        let rows = explode(&env, 2).unwrap();
        let view: Vec<(&str, f64, DateTime<Utc>)> = rows
            .iter()
            .map(|s| (s.metric_name.as_str(), s.value, s.timestamp))
            .collect();
        assert_eq!(
            view,
            vec![
                ("acc_x", 1.0, t),
                ("acc_x", 2.0, t + Duration::milliseconds(2)),
                ("gyro_z", 3.0, t),
                ("gyro_z", 4.0, t + Duration::milliseconds(2)),
            ]
        );
        assert!(rows.iter().all(|s| s.device_id == 7 && s.scenario_id == 19 && s.frame_id == 1));
    }

    #[test]
    fn test_explode_emits_n_times_l_rows() {
        let channels: Vec<(&str, Vec<f64>)> = crate::protocol::KNOWN_METRICS
            .iter()
            .map(|m| (*m, vec![0.5; 50]))
            .collect();
        let rows = explode(&envelope(channels), 2).unwrap();
        assert_eq!(rows.len(), 8 * 50);
    }

    #[test]
    fn test_explode_is_deterministic() {
        let env = envelope(vec![("temp", vec![20.0, 20.1, 20.2])]);
        assert_eq!(explode(&env, 2).unwrap(), explode(&env, 2).unwrap());
    }

    #[test]
    fn test_unequal_channel_lengths() {
        let env = envelope(vec![("acc_x", vec![1.0, 2.0, 3.0]), ("temp", vec![9.0])]);
        let rows = explode(&env, 2).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows.iter().filter(|s| s.metric_name == "temp").count(), 1);
    }

    #[test]
    fn test_bad_timestamp_is_malformed() {
        let mut env = envelope(vec![("acc_x", vec![1.0])]);
        env.timestamp = "yesterday".to_string();
        assert!(matches!(explode(&env, 2), Err(PipelineError::Malformed(_))));
    }

    #[test]
    fn test_sample_timestamp_overflow() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(sample_timestamp(t, 3, 2), Some(t + Duration::milliseconds(6)));
        assert_eq!(sample_timestamp(t, 1, u64::MAX / 2), None);
        assert_eq!(sample_timestamp(t, usize::MAX, 2), None);

        let env = envelope(vec![("acc_x", vec![1.0, 2.0])]);
        assert!(matches!(explode(&env, u64::MAX / 2), Err(PipelineError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_run_skips_poison_and_failed_batches() {
        let log = MemoryLog::new();
        let good = serde_json::to_vec(&envelope(vec![("acc_x", vec![1.0, 2.0])])).unwrap();
        log.push_raw("gateway.raw", b"not json".to_vec());
        log.push_raw("gateway.raw", good.clone());

        let store = Arc::new(MemorySampleStore::new());
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let transformer = StreamTransformer::new(store.clone(), metrics, 2);

        let mut source = log.source("gateway.raw");
        transformer.run(&mut source).await.unwrap();
        assert_eq!(source.acked(), &[0, 1]);
        assert_eq!(store.len(), 2);

        store.set_unavailable(true);
        log.push_raw("gateway.raw", good);
        let mut source = log.source("gateway.raw");
        transformer.run(&mut source).await.unwrap();
        store.set_unavailable(false);
        assert_eq!(store.len(), 2);
    }

    /// Source whose offset store always fails, as after a rebalance
    struct RevokedPartitions(crate::durable_log::MemorySource);

    #[async_trait::async_trait]
    impl LogSource for RevokedPartitions {
        async fn next_record(&mut self) -> PipelineResult<Option<LogRecord>> {
            self.0.next_record().await
        }

        async fn ack(&mut self, _record: &LogRecord) -> PipelineResult<()> {
            Err(PipelineError::Transport("partition revoked".to_string()))
        }
    }

    #[tokio::test]
    async fn test_offset_store_failure_keeps_consuming() {
        let log = MemoryLog::new();
        let first = envelope(vec![("acc_x", vec![1.0, 2.0])]);
        let mut second = first.clone();
        second.frame_id = 2;
        log.push_raw("gateway.raw", serde_json::to_vec(&first).unwrap());
        log.push_raw("gateway.raw", serde_json::to_vec(&second).unwrap());

        let store = Arc::new(MemorySampleStore::new());
        let transformer =
            StreamTransformer::new(store.clone(), Arc::new(PipelineMetrics::new().unwrap()), 2);

        let mut source = RevokedPartitions(log.source("gateway.raw"));
        transformer.run(&mut source).await.unwrap();
        assert_eq!(store.len(), 4);
    }
}
