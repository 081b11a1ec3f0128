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

// In-memory store, row order is insertion order

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{ProcessedSample, SampleStore};
use crate::error::{PipelineError, PipelineResult};

#[derive(Default)]
pub struct MemorySampleStore {
    rows: Mutex<Vec<ProcessedSample>>,
    unavailable: AtomicBool,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> PipelineResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::Store("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn initialize(&self) -> PipelineResult<()> {
        self.check_available()
    }

    async fn insert_batch(&self, samples: &[ProcessedSample]) -> PipelineResult<u64> {
        self.check_available()?;
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| PipelineError::Store("store lock poisoned".to_string()))?;
        rows.extend_from_slice(samples);
        Ok(samples.len() as u64)
    }

    async fn load_scenario(&self, scenario_id: i64) -> PipelineResult<Vec<ProcessedSample>> {
        self.check_available()?;
        let rows = self
            .rows
            .lock()
            .map_err(|_| PipelineError::Store("store lock poisoned".to_string()))?;

        let mut samples: Vec<ProcessedSample> = rows
            .iter()
            .filter(|s| s.scenario_id == scenario_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps
        samples.sort_by_key(|s| s.timestamp);
        Ok(samples)
    }

    fn store_type(&self) -> &str {
        "memory"
    }
}
