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

// Long-format sample store
//
// One row per scalar observation. Rows are written once per frame as a
// single bulk insert and read back per scenario for export.

pub mod memory;
pub mod postgres;

pub use memory::MemorySampleStore;
pub use postgres::PostgresSampleStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PipelineResult;

/// One (device, scenario, frame, metric, sample index) observation
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSample {
    pub device_id: i64,
    pub scenario_id: i64,
    pub frame_id: u64,
    pub metric_name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Create tables and indexes if needed
    async fn initialize(&self) -> PipelineResult<()>;

    /// Insert all samples of one frame atomically
    async fn insert_batch(&self, samples: &[ProcessedSample]) -> PipelineResult<u64>;

    /// All samples of a scenario ordered by timestamp, then insertion order
    async fn load_scenario(&self, scenario_id: i64) -> PipelineResult<Vec<ProcessedSample>>;

    fn store_type(&self) -> &str;
}
