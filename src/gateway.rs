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

//! Ingest gateway: bridges device-pushed raw frames into the durable log.
//!
//! Each raw frame is decoded, its scenario is checked against the validation
//! endpoint, and admitted frames are stamped with a frame id and a receipt
//! timestamp before being appended to the log. Rejected or undecodable frames
//! are dropped with a log line; nothing is retried.
//!
//! Frame ids come from a process-local counter per scenario, so a restart
//! starts numbering from 1 again.

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use zenoh::Session;

use crate::durable_log::LogPublisher;
use crate::error::{PipelineError, PipelineResult};
use crate::protocol::{format_batch_timestamp, RawDevicePayload, SensorEnvelope};
use crate::telemetry::PipelineMetrics;
use crate::validation::ScenarioValidator;

/// Monotonic frame numbering keyed by scenario id
#[derive(Default)]
pub struct FrameSequencer {
    counters: DashMap<i64, AtomicU64>,
}

impl FrameSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next id for `scenario_id`, starting at 1
    pub fn next(&self, scenario_id: i64) -> u64 {
        if let Some(counter) = self.counters.get(&scenario_id) {
            return counter.fetch_add(1, Ordering::SeqCst) + 1;
        }
        self.counters
            .entry(scenario_id)
            .or_default()
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    /// Last id handed out for `scenario_id` (0 if none)
    pub fn current(&self, scenario_id: i64) -> u64 {
        self.counters
            .get(&scenario_id)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

pub struct IngestGateway {
    validator: Arc<dyn ScenarioValidator>,
    publisher: Arc<dyn LogPublisher>,
    sequencer: FrameSequencer,
    metrics: Arc<PipelineMetrics>,
    log_topic: String,
}

impl IngestGateway {
    pub fn new(
        validator: Arc<dyn ScenarioValidator>,
        publisher: Arc<dyn LogPublisher>,
        metrics: Arc<PipelineMetrics>,
        log_topic: String,
    ) -> Self {
        Self {
            validator,
            publisher,
            sequencer: FrameSequencer::new(),
            metrics,
            log_topic,
        }
    }

    pub fn sequencer(&self) -> &FrameSequencer {
        &self.sequencer
    }

    /// Assign frame id and receipt timestamp
    pub fn stamp(&self, raw: RawDevicePayload, received_at: DateTime<Utc>) -> SensorEnvelope {
        let frame_id = self.sequencer.next(raw.scenario_id);
        let device_id = raw.device_id;
        let scenario_id = raw.scenario_id;

        SensorEnvelope {
            data: raw.into_channels(),
            device_id,
            scenario_id,
            timestamp: format_batch_timestamp(received_at),
            frame_id,
        }
    }

    /// Run one raw message through decode, validate, stamp and publish
    pub async fn handle_payload(&self, source: &str, payload: &[u8]) -> PipelineResult<SensorEnvelope> {
        let start = Instant::now();
        self.metrics.gateway_messages_received.inc();

        let result = self.admit(payload).await;

        let status = match &result {
            Ok(envelope) => {
                debug!(
                    "Published frame {} (device {}, scenario {}, {} samples) from '{}'",
                    envelope.frame_id,
                    envelope.device_id,
                    envelope.scenario_id,
                    envelope.sample_count(),
                    source
                );
                "published"
            }
            Err(PipelineError::Malformed(reason)) => {
                warn!("Dropping undecodable frame from '{}': {}", source, reason);
                "malformed"
            }
            Err(e @ PipelineError::ValidationRejected { .. }) => {
                warn!("Dropping frame from '{}': {}", source, e);
                "rejected"
            }
            Err(e) => {
                error!("Dropping frame from '{}': {}", source, e);
                "publish_failed"
            }
        };

        self.metrics.gateway_frames.with_label_values(&[status]).inc();
        self.metrics
            .gateway_duration_ms
            .observe(start.elapsed().as_secs_f64() * 1000.0);

        result
    }

    async fn admit(&self, payload: &[u8]) -> PipelineResult<SensorEnvelope> {
        let raw: RawDevicePayload = serde_json::from_slice(payload)
            .map_err(|e| PipelineError::Malformed(e.to_string()))?;

        let validation_start = Instant::now();
        let verdict = self.validator.validate(raw.scenario_id).await;
        if !matches!(verdict, Err(PipelineError::Transport(_))) {
            self.metrics
                .gateway_validation_duration_ms
                .observe(validation_start.elapsed().as_secs_f64() * 1000.0);
        }
        // An unreachable validator rejects the frame
        verdict.map_err(|e| match e {
            PipelineError::Transport(reason) => PipelineError::ValidationRejected {
                scenario_id: raw.scenario_id,
                status: 502,
                reason,
            },
            other => other,
        })?;

        let envelope = self.stamp(raw, Utc::now());
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| PipelineError::Malformed(e.to_string()))?;

        self.publisher
            .publish(&self.log_topic, &envelope.device_id.to_string(), bytes)
            .await?;

        Ok(envelope)
    }

    /// Subscribe to the raw device topics and forward frames until the subscription closes.
    ///
    /// Frames are handled one at a time in receipt order.
    pub async fn run(&self, session: &Session, key_expr: &str) -> Result<()> {
        let subscriber = session
            .declare_subscriber(key_expr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to subscribe to '{}': {}", key_expr, e))?;

        info!("Gateway listening on '{}'", key_expr);

        while let Ok(sample) = subscriber.recv_async().await {
            let source = sample.key_expr().as_str().to_string();
            let payload = sample.payload().to_bytes();
            // Outcome is already logged and counted
            let _ = self.handle_payload(&source, &payload).await;
        }

        info!("Gateway subscription on '{}' closed", key_expr);
        Ok(())
    }
}
