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

//! Export pipeline: one scenario from the long-format store to one
//! partitioned columnar object.
//!
//! An export loads every stored sample of the scenario, pivots them back
//! into wide rows, writes the file into a private staging directory and
//! uploads it under `device_id=<d>/scenario_id=<s>/data.parquet`. The staging
//! directory is removed whether or not the export succeeded, and nothing is
//! uploaded unless the file was completely written.
//!
//! Exports are triggered either by a direct request (see
//! [`crate::control::ExportRequestInterface`]) or by an
//! [`ExportNotification`] read from the durable log.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ExporterSettings;
use crate::durable_log::{LogPublisher, LogSource};
use crate::error::{PipelineError, PipelineResult};
use crate::parquet_writer::ParquetFileWriter;
use crate::pivot::{pivot, ExportRow};
use crate::protocol::ExportNotification;
use crate::storage::ObjectStorage;
use crate::store::{ProcessedSample, SampleStore};
use crate::telemetry::PipelineMetrics;

pub const TRIGGER_REQUEST: &str = "request";
pub const TRIGGER_NOTIFICATION: &str = "notification";

/// Object key (and staging path) of a scenario export
pub fn object_key(device_id: i64, scenario_id: i64) -> String {
    format!("device_id={}/scenario_id={}/data.parquet", device_id, scenario_id)
}

/// Summary of a finished export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub scenario_id: i64,
    pub device_id: i64,
    pub object_key: String,
    pub samples: usize,
    pub rows: usize,
}

/// The partition's device id; a scenario spanning devices cannot be exported
fn single_device(scenario_id: i64, samples: &[ProcessedSample]) -> PipelineResult<i64> {
    let device_id = samples
        .first()
        .map(|s| s.device_id)
        .ok_or(PipelineError::EmptyExport(scenario_id))?;

    if let Some(other) = samples.iter().find(|s| s.device_id != device_id) {
        return Err(PipelineError::Export(format!(
            "scenario {} has samples from devices {} and {}",
            scenario_id, device_id, other.device_id
        )));
    }
    Ok(device_id)
}

pub struct ExportPipeline {
    store: Arc<dyn SampleStore>,
    storage: Arc<dyn ObjectStorage>,
    writer: Arc<ParquetFileWriter>,
    metrics: Arc<PipelineMetrics>,
    work_dir: PathBuf,
}

impl ExportPipeline {
    pub fn new(
        store: Arc<dyn SampleStore>,
        storage: Arc<dyn ObjectStorage>,
        metrics: Arc<PipelineMetrics>,
        settings: &ExporterSettings,
    ) -> PipelineResult<Self> {
        Ok(Self {
            store,
            storage,
            writer: Arc::new(ParquetFileWriter::new(&settings.compression)?),
            metrics,
            work_dir: PathBuf::from(&settings.work_dir),
        })
    }

    /// Export with outcome logging and instruments labelled by `trigger`
    pub async fn export(&self, scenario_id: i64, trigger: &str) -> PipelineResult<ExportOutcome> {
        let start = Instant::now();
        let result = self.export_scenario(scenario_id).await;

        let status = match &result {
            Ok(outcome) => {
                info!(
                    "Exported scenario {} ({} samples, {} rows) to {}/{}",
                    scenario_id,
                    outcome.samples,
                    outcome.rows,
                    self.storage.bucket(),
                    outcome.object_key
                );
                "success"
            }
            Err(PipelineError::EmptyExport(_)) => {
                warn!("Nothing to export for scenario {}", scenario_id);
                "empty"
            }
            Err(e) => {
                error!("Export of scenario {} failed: {}", scenario_id, e);
                "error"
            }
        };

        self.metrics
            .exporter_exports
            .with_label_values(&[trigger, status])
            .inc();
        self.metrics
            .exporter_duration_seconds
            .with_label_values(&[trigger, status])
            .observe(start.elapsed().as_secs_f64());

        result
    }

    /// Load, pivot, write and upload one scenario
    pub async fn export_scenario(&self, scenario_id: i64) -> PipelineResult<ExportOutcome> {
        let samples = self.store.load_scenario(scenario_id).await?;
        let device_id = single_device(scenario_id, &samples)?;

        let rows = pivot(&samples);
        if rows.is_empty() {
            // Only unknown metrics were stored
            return Err(PipelineError::EmptyExport(scenario_id));
        }
        let row_count = rows.len();

        let key = object_key(device_id, scenario_id);
        let staging = self.work_dir.join(Uuid::new_v4().to_string());

        let result = self.stage_and_upload(&staging, &key, rows).await;

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove staging dir {}: {}", staging.display(), e);
            }
        }
        result?;

        Ok(ExportOutcome {
            scenario_id,
            device_id,
            object_key: key,
            samples: samples.len(),
            rows: row_count,
        })
    }

    async fn stage_and_upload(&self, staging: &Path, key: &str, rows: Vec<ExportRow>) -> PipelineResult<()> {
        let local = staging.join(key);
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::Export(format!("create {}: {}", parent.display(), e))
            })?;
        }

        let writer = self.writer.clone();
        let path = local.clone();
        tokio::task::spawn_blocking(move || writer.write_file(&rows, &path))
            .await
            .map_err(|e| PipelineError::Export(format!("writer task failed: {}", e)))??;

        self.storage
            .put_file(key, &local)
            .await
            .map_err(|e| PipelineError::Storage(format!("{:#}", e)))
    }

    /// Export every scenario named on the notification topic until the source ends.
    ///
    /// Failed exports are logged and skipped; only a consume failure stops the loop.
    pub async fn run_notifications(&self, source: &mut dyn LogSource) -> PipelineResult<()> {
        info!("Exporter waiting for notifications");

        while let Some(record) = source.next_record().await? {
            match serde_json::from_slice::<ExportNotification>(&record.payload) {
                Ok(notification) => {
                    // Outcome is already logged and counted
                    let _ = self
                        .export(notification.scenario_id, TRIGGER_NOTIFICATION)
                        .await;
                }
                Err(e) => warn!(
                    "Skipping undecodable notification {}/{}@{}: {}",
                    record.topic, record.partition, record.offset, e
                ),
            }
            if let Err(e) = source.ack(&record).await {
                warn!(
                    "Could not store offset for {}/{}@{}: {}",
                    record.topic, record.partition, record.offset, e
                );
            }
        }

        Ok(())
    }
}

/// Publishes export triggers on the notification topic
pub struct ExportNotifier {
    publisher: Arc<dyn LogPublisher>,
    topic: String,
}

impl ExportNotifier {
    pub fn new(publisher: Arc<dyn LogPublisher>, topic: String) -> Self {
        Self { publisher, topic }
    }

    pub async fn notify(&self, scenario_id: i64) -> PipelineResult<()> {
        let payload = serde_json::to_vec(&ExportNotification { scenario_id })
            .map_err(|e| PipelineError::Malformed(e.to_string()))?;
        self.publisher
            .publish(&self.topic, &scenario_id.to_string(), payload)
            .await?;
        info!("Requested export of scenario {} on '{}'", scenario_id, self.topic);
        Ok(())
    }
}
