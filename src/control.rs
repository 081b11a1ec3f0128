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

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use zenoh::query::Query;
use zenoh::Session;

use crate::error::PipelineError;
use crate::exporter::{ExportPipeline, TRIGGER_REQUEST};
use crate::protocol::ExportResponse;

/// Last key segment as a scenario id
pub fn scenario_from_key(key_expr: &str) -> Option<i64> {
    key_expr.rsplit('/').next()?.parse().ok()
}

/// Run one export request addressed to `key_expr` and render the JSON reply.
///
/// Success yields an [`ExportResponse`]; failures yield problem details
/// carrying 400, 404 or 500.
pub async fn respond(pipeline: &ExportPipeline, key_expr: &str) -> Result<Vec<u8>> {
    let Some(scenario_id) = scenario_from_key(key_expr) else {
        let err = PipelineError::Malformed(format!("no scenario id in '{}'", key_expr));
        return Ok(serde_json::to_vec(&err.to_problem(key_expr))?);
    };

    let body = match pipeline.export(scenario_id, TRIGGER_REQUEST).await {
        Ok(outcome) => serde_json::to_vec(&ExportResponse {
            success: true,
            message: format!("Exported {} rows", outcome.rows),
            scenario_id,
            object_key: Some(outcome.object_key),
            rows: Some(outcome.rows),
        })?,
        Err(e) => serde_json::to_vec(&e.to_problem(key_expr))?,
    };
    Ok(body)
}

/// Synchronous export requests via Zenoh queryable on `<prefix>/<scenario_id>`
pub struct ExportRequestInterface {
    session: Session,
    pipeline: Arc<ExportPipeline>,
    key_prefix: String,
}

impl ExportRequestInterface {
    pub fn new(session: Session, pipeline: Arc<ExportPipeline>, key_prefix: String) -> Self {
        Self {
            session,
            pipeline,
            key_prefix,
        }
    }

    /// Serve requests until the queryable closes
    pub async fn run(&self) -> Result<()> {
        let request_key = format!("{}/*", self.key_prefix.trim_end_matches('/'));
        let queryable = self
            .session
            .declare_queryable(&request_key)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        info!("Export requests accepted on '{}'", request_key);

        while let Ok(query) = queryable.recv_async().await {
            let pipeline = self.pipeline.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_export_query(query, pipeline).await {
                    error!("Error handling export query: {}", e);
                }
            });
        }

        Ok(())
    }

    async fn handle_export_query(query: Query, pipeline: Arc<ExportPipeline>) -> Result<()> {
        let key_expr = query.key_expr().clone();
        info!("Received export query on '{}'", key_expr);

        let body = respond(&pipeline, key_expr.as_str()).await?;
        query
            .reply(key_expr, body)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExporterSettings, FilesystemConfig};
    use crate::protocol::ProblemDetails;
    use crate::storage::FilesystemStorage;
    use crate::store::{MemorySampleStore, ProcessedSample, SampleStore};
    use crate::telemetry::PipelineMetrics;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir, store: Arc<MemorySampleStore>) -> ExportPipeline {
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
        ExportPipeline::new(
            store,
            Arc::new(storage),
            Arc::new(PipelineMetrics::new().unwrap()),
            &settings,
        )
        .unwrap()
    }

    #[test]
    fn test_scenario_from_key() {
        assert_eq!(scenario_from_key("export/request/19"), Some(19));
        assert_eq!(scenario_from_key("export/request/abc"), None);
        assert_eq!(scenario_from_key("export/request/"), None);
    }

    #[tokio::test]
    async fn test_respond_success() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemorySampleStore::new());
        store
            .insert_batch(&[ProcessedSample {
                device_id: 7,
                scenario_id: 19,
                frame_id: 1,
                metric_name: "acc_x".to_string(),
                value: 1.0,
                timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            }])
            .await
            .unwrap();

        let body = respond(&pipeline(&dir, store), "export/request/19").await.unwrap();
        let response: ExportResponse = serde_json::from_slice(&body).unwrap();
        assert!(response.success);
        assert_eq!(response.rows, Some(1));
        assert_eq!(
            response.object_key.as_deref(),
            Some("device_id=7/scenario_id=19/data.parquet")
        );
    }

    #[tokio::test]
    async fn test_respond_not_found() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemorySampleStore::new());

        let body = respond(&pipeline(&dir, store), "export/request/5").await.unwrap();
        let problem: ProblemDetails = serde_json::from_slice(&body).unwrap();
        assert_eq!(problem.status, 404);
        assert_eq!(problem.instance, "export/request/5");
    }

    #[tokio::test]
    async fn test_respond_bad_id() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemorySampleStore::new());

        let body = respond(&pipeline(&dir, store), "export/request/latest").await.unwrap();
        let problem: ProblemDetails = serde_json::from_slice(&body).unwrap();
        assert_eq!(problem.status, 400);
    }

    #[tokio::test]
    async fn test_respond_store_down() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemorySampleStore::new());
        store.set_unavailable(true);

        let body = respond(&pipeline(&dir, store), "export/request/19").await.unwrap();
        let problem: ProblemDetails = serde_json::from_slice(&body).unwrap();
        assert_eq!(problem.status, 500);
    }
}
