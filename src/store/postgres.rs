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

// PostgreSQL store implementation

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info, instrument};

use super::{ProcessedSample, SampleStore};
use crate::config::DatabaseConfig;
use crate::error::PipelineResult;

const CREATE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS processed_samples (
    id          BIGSERIAL PRIMARY KEY,
    device_id   BIGINT NOT NULL,
    scenario_id BIGINT NOT NULL,
    frame_id    BIGINT NOT NULL,
    metric_name TEXT NOT NULL,
    value       DOUBLE PRECISION NOT NULL,
    timestamp   TIMESTAMPTZ NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_processed_samples_scenario_ts
    ON processed_samples (scenario_id, timestamp, id);
";

const INSERT_BATCH: &str = "
INSERT INTO processed_samples (device_id, scenario_id, frame_id, metric_name, value, timestamp)
SELECT * FROM UNNEST($1::BIGINT[], $2::BIGINT[], $3::BIGINT[], $4::TEXT[], $5::DOUBLE PRECISION[], $6::TIMESTAMPTZ[])
";

const SELECT_SCENARIO: &str = "
SELECT device_id, scenario_id, frame_id, metric_name, value, timestamp
FROM processed_samples
WHERE scenario_id = $1
ORDER BY timestamp ASC, id ASC
";

/// Pooled PostgreSQL store
#[derive(Clone)]
pub struct PostgresSampleStore {
    pool: Pool,
}

impl PostgresSampleStore {
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.name.clone());
        cfg.user = Some(config.user.clone());
        cfg.password = Some(config.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create PostgreSQL pool")?;
        pool.resize(config.max_pool_size);

        info!(
            "PostgreSQL store configured for {}:{}/{}",
            config.host, config.port, config.name
        );

        Ok(Self { pool })
    }
}

#[async_trait]
impl SampleStore for PostgresSampleStore {
    async fn initialize(&self) -> PipelineResult<()> {
        let client = self.pool.get().await?;
        client.batch_execute(CREATE_SCHEMA).await?;
        debug!("processed_samples schema ready");
        Ok(())
    }

    #[instrument(skip(self, samples), fields(rows = samples.len()))]
    async fn insert_batch(&self, samples: &[ProcessedSample]) -> PipelineResult<u64> {
        if samples.is_empty() {
            return Ok(0);
        }

        let mut device_ids = Vec::with_capacity(samples.len());
        let mut scenario_ids = Vec::with_capacity(samples.len());
        let mut frame_ids = Vec::with_capacity(samples.len());
        let mut metric_names = Vec::with_capacity(samples.len());
        let mut values = Vec::with_capacity(samples.len());
        let mut timestamps: Vec<DateTime<Utc>> = Vec::with_capacity(samples.len());

        for sample in samples {
            device_ids.push(sample.device_id);
            scenario_ids.push(sample.scenario_id);
            frame_ids.push(sample.frame_id as i64);
            metric_names.push(sample.metric_name.as_str());
            values.push(sample.value);
            timestamps.push(sample.timestamp);
        }

        let client = self.pool.get().await?;
        let inserted = client
            .execute(
                INSERT_BATCH,
                &[
                    &device_ids,
                    &scenario_ids,
                    &frame_ids,
                    &metric_names,
                    &values,
                    &timestamps,
                ],
            )
            .await?;

        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn load_scenario(&self, scenario_id: i64) -> PipelineResult<Vec<ProcessedSample>> {
        let client = self.pool.get().await?;
        let rows = client.query(SELECT_SCENARIO, &[&scenario_id]).await?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in rows {
            let frame_id: i64 = row.try_get("frame_id")?;
            samples.push(ProcessedSample {
                device_id: row.try_get("device_id")?,
                scenario_id: row.try_get("scenario_id")?,
                frame_id: frame_id as u64,
                metric_name: row.try_get("metric_name")?,
                value: row.try_get("value")?,
                timestamp: row.try_get("timestamp")?,
            });
        }

        debug!("Loaded {} samples for scenario {}", samples.len(), scenario_id);
        Ok(samples)
    }

    fn store_type(&self) -> &str {
        "postgres"
    }
}
