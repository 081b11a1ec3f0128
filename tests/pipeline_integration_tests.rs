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

// Gateway -> transformer -> exporter with in-process log, store and storage

use arrow::array::{Array, Float64Array, TimestampMicrosecondArray, UInt64Array};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use sensor_pipeline::config::{ExporterSettings, FilesystemConfig};
use sensor_pipeline::storage::FilesystemStorage;
use sensor_pipeline::{
    ExportNotifier, ExportPipeline, IngestGateway, MemoryLog, MemorySampleStore, PipelineError,
    PipelineMetrics, PipelineResult, SampleStore, ScenarioValidator, StreamTransformer,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const RAW_TOPIC: &str = "gateway.raw";
const NOTIFICATION_TOPIC: &str = "export.notification";

struct ActiveScenarios(Vec<i64>);

#[async_trait]
impl ScenarioValidator for ActiveScenarios {
    async fn validate(&self, scenario_id: i64) -> PipelineResult<()> {
        if self.0.contains(&scenario_id) {
            Ok(())
        } else {
            Err(PipelineError::ValidationRejected {
                scenario_id,
                status: 400,
                reason: "scenario is not active".to_string(),
            })
        }
    }
}

struct Harness {
    log: MemoryLog,
    store: Arc<MemorySampleStore>,
    gateway: IngestGateway,
    transformer: StreamTransformer,
    exporter: ExportPipeline,
    bucket_dir: PathBuf,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let log = MemoryLog::new();
    let store = Arc::new(MemorySampleStore::new());
    let metrics = Arc::new(PipelineMetrics::new().unwrap());

    let gateway = IngestGateway::new(
        Arc::new(ActiveScenarios(vec![19, 20])),
        Arc::new(log.clone()),
        metrics.clone(),
        RAW_TOPIC.to_string(),
    );
    let transformer = StreamTransformer::new(store.clone(), metrics.clone(), 2);

    let storage = FilesystemStorage::new(
        FilesystemConfig {
            base_path: dir.path().join("objects").to_string_lossy().to_string(),
        },
        "neuro-lab",
    )
    .unwrap();
    let settings = ExporterSettings {
        work_dir: dir.path().join("work").to_string_lossy().to_string(),
        ..ExporterSettings::default()
    };
    let exporter = ExportPipeline::new(store.clone(), Arc::new(storage), metrics, &settings).unwrap();

    Harness {
        log,
        store,
        gateway,
        transformer,
        exporter,
        bucket_dir: dir.path().join("objects").join("neuro-lab"),
        _dir: dir,
    }
}

fn read_parquet(path: &Path) -> RecordBatch {
    let file = File::open(path).unwrap();
    let mut batches: Vec<RecordBatch> = ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(batches.len(), 1);
    batches.remove(0)
}

fn f64_column<'a>(batch: &'a RecordBatch, name: &str) -> &'a Float64Array {
    batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap()
}

#[tokio::test]
async fn test_frame_round_trips_to_partitioned_file() {
    let h = harness();

    let frame = br#"{"data":{"acc_x":[1,2],"gyro_z":[3,4]},"device_id":7,"scenario_id":19}"#;
    let envelope = h.gateway.handle_payload("device/7/raw", frame).await.unwrap();

    let mut source = h.log.source(RAW_TOPIC);
    h.transformer.run(&mut source).await.unwrap();
    assert_eq!(h.store.len(), 4);

    let outcome = h.exporter.export_scenario(19).await.unwrap();
    assert_eq!(outcome.object_key, "device_id=7/scenario_id=19/data.parquet");
    assert_eq!(outcome.rows, 2);

    let batch = read_parquet(&h.bucket_dir.join(&outcome.object_key));
    assert_eq!(batch.num_rows(), 2);

    let ts = batch
        .column_by_name("timestamp")
        .unwrap()
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .unwrap();
    let batch_start = sensor_pipeline::protocol::parse_batch_timestamp(&envelope.timestamp).unwrap();
    assert_eq!(ts.value(0), batch_start.timestamp_micros());
    assert_eq!(ts.value(1), batch_start.timestamp_micros() + 2_000);

    let frame_ids = batch
        .column_by_name("frame_id")
        .unwrap()
        .as_any()
        .downcast_ref::<UInt64Array>()
        .unwrap();
    assert_eq!(frame_ids.values().to_vec(), vec![1, 1]);

    assert_eq!(f64_column(&batch, "acc_x").values().to_vec(), vec![1.0, 2.0]);
    assert_eq!(f64_column(&batch, "gyro_z").values().to_vec(), vec![3.0, 4.0]);
    for missing in ["acc_y", "acc_z", "gyro_x", "gyro_y", "curr_v", "temp"] {
        assert_eq!(f64_column(&batch, missing).null_count(), 2, "{} should be null", missing);
    }
}

#[tokio::test]
async fn test_rejected_and_malformed_frames_never_reach_store() {
    let h = harness();

    let inactive = br#"{"data":{"temp":[20.0]},"device_id":7,"scenario_id":99}"#;
    assert!(h.gateway.handle_payload("device/7/raw", inactive).await.is_err());
    assert!(h.gateway.handle_payload("device/7/raw", b"\x00\x01").await.is_err());

    let active = br#"{"data":{"temp":[20.0]},"device_id":7,"scenario_id":19}"#;
    h.gateway.handle_payload("device/7/raw", active).await.unwrap();

    let mut source = h.log.source(RAW_TOPIC);
    h.transformer.run(&mut source).await.unwrap();

    assert_eq!(h.log.records(RAW_TOPIC).len(), 1);
    assert_eq!(h.store.len(), 1);
    let stored = h.store.load_scenario(99).await.unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_frames_keep_order_across_scenarios() {
    let h = harness();

    for i in 0..3 {
        let body = format!(
            r#"{{"data":{{"curr_v":[{}.0, {}.5]}},"device_id":3,"scenario_id":20}}"#,
            i, i
        );
        h.gateway
            .handle_payload("device/3/raw", body.as_bytes())
            .await
            .unwrap();
    }
    let other = br#"{"data":{"curr_v":[9.0]},"device_id":4,"scenario_id":19}"#;
    let envelope = h.gateway.handle_payload("device/4/raw", other).await.unwrap();
    assert_eq!(envelope.frame_id, 1);

    let mut source = h.log.source(RAW_TOPIC);
    h.transformer.run(&mut source).await.unwrap();

    let outcome = h.exporter.export_scenario(20).await.unwrap();
    assert_eq!(outcome.device_id, 3);
    assert_eq!(outcome.rows, 6);

    let batch = read_parquet(&h.bucket_dir.join(&outcome.object_key));
    let frame_ids = batch
        .column_by_name("frame_id")
        .unwrap()
        .as_any()
        .downcast_ref::<UInt64Array>()
        .unwrap();
    assert_eq!(frame_ids.values().to_vec(), vec![1, 1, 2, 2, 3, 3]);
    assert_eq!(
        f64_column(&batch, "curr_v").values().to_vec(),
        vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]
    );
}

#[tokio::test]
async fn test_repeated_export_overwrites_identically() {
    let h = harness();
    let frame = br#"{"data":{"acc_z":[0.1,0.2,0.3]},"device_id":7,"scenario_id":19}"#;
    h.gateway.handle_payload("device/7/raw", frame).await.unwrap();

    let mut source = h.log.source(RAW_TOPIC);
    h.transformer.run(&mut source).await.unwrap();

    let first = h.exporter.export_scenario(19).await.unwrap();
    let first_batch = read_parquet(&h.bucket_dir.join(&first.object_key));
    let second = h.exporter.export_scenario(19).await.unwrap();
    let second_batch = read_parquet(&h.bucket_dir.join(&second.object_key));

    assert_eq!(first.object_key, second.object_key);
    assert_eq!(first_batch, second_batch);
}

#[tokio::test]
async fn test_notification_driven_export() {
    let h = harness();
    let frame = br#"{"data":{"temp":[21.5]},"device_id":5,"scenario_id":19}"#;
    h.gateway.handle_payload("device/5/raw", frame).await.unwrap();

    let mut source = h.log.source(RAW_TOPIC);
    h.transformer.run(&mut source).await.unwrap();

    let notifier = ExportNotifier::new(Arc::new(h.log.clone()), NOTIFICATION_TOPIC.to_string());
    notifier.notify(19).await.unwrap();
    notifier.notify(19).await.unwrap();

    let mut notifications = h.log.source(NOTIFICATION_TOPIC);
    h.exporter.run_notifications(&mut notifications).await.unwrap();

    assert_eq!(notifications.acked(), &[0, 1]);
    let batch = read_parquet(&h.bucket_dir.join("device_id=5/scenario_id=19/data.parquet"));
    assert_eq!(f64_column(&batch, "temp").value(0), 21.5);
}
