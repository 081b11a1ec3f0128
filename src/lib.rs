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

// Multi-channel sensor pipeline
//
// Three independent stages connected through a durable log and a
// long-format store:
// - Gateway: raw device frames from Zenoh, scenario validation, frame
//   stamping, publish to Kafka
// - Transformer: Kafka envelopes exploded into per-sample rows in Postgres
// - Exporter: per-scenario pivot back to wide rows, Parquet file, upload to
//   object storage

pub mod config;
pub mod control;
pub mod durable_log;
pub mod error;
pub mod exporter;
pub mod gateway;
pub mod parquet_writer;
pub mod pivot;
pub mod protocol;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod transformer;
pub mod validation;

// Re-export main types
pub use config::{load_config, load_config_with_env, PipelineConfig};
pub use control::ExportRequestInterface;
pub use durable_log::{KafkaPublisher, KafkaSubscriber, LogPublisher, LogRecord, LogSource, MemoryLog};
pub use error::{PipelineError, PipelineResult};
pub use exporter::{object_key, ExportNotifier, ExportOutcome, ExportPipeline};
pub use gateway::{FrameSequencer, IngestGateway};
pub use pivot::{pivot, ExportRow};
pub use protocol::{
    ChannelData, ExportNotification, ExportResponse, ProblemDetails, RawDevicePayload,
    SensorEnvelope, KNOWN_METRICS,
};
pub use storage::{ObjectStorage, StorageFactory};
pub use store::{MemorySampleStore, PostgresSampleStore, ProcessedSample, SampleStore};
pub use telemetry::PipelineMetrics;
pub use transformer::{explode, StreamTransformer};
pub use validation::{HttpScenarioValidator, ScenarioValidator};
