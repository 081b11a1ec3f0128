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

// Client for the external scenario validation endpoint

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::ValidationConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::protocol::{ProblemDetails, ValidationRequest, PROBLEM_TYPE_VALIDATION_FAILED};

/// Decides whether frames for a scenario may enter the pipeline
#[async_trait]
pub trait ScenarioValidator: Send + Sync {
    /// Ok when the scenario is currently active
    async fn validate(&self, scenario_id: i64) -> PipelineResult<()>;
}

/// Validator backed by `POST {base_url}/scenario-validation`
pub struct HttpScenarioValidator {
    client: Client,
    endpoint: String,
}

impl HttpScenarioValidator {
    pub fn new(config: &ValidationConfig) -> anyhow::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/scenario-validation",
                config.base_url.trim_end_matches('/')
            ),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ScenarioValidator for HttpScenarioValidator {
    async fn validate(&self, scenario_id: i64) -> PipelineResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ValidationRequest { scenario_id })
            .send()
            .await
            .map_err(|e| PipelineError::Transport(format!("validation request failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 200 {
            debug!("Scenario {} accepted", scenario_id);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(rejection_from_body(scenario_id, status.as_u16(), &body))
    }
}

/// Build the rejection for a non-200 validation reply
pub fn rejection_from_body(scenario_id: i64, status: u16, body: &str) -> PipelineError {
    let reason = match serde_json::from_str::<ProblemDetails>(body) {
        Ok(problem) if problem.problem_type == PROBLEM_TYPE_VALIDATION_FAILED => {
            let fields = problem
                .errors
                .unwrap_or_default()
                .into_iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join(", ");
            if fields.is_empty() {
                format!("{}: {}", problem.title, problem.detail)
            } else {
                format!("{}: {} [{}]", problem.title, problem.detail, fields)
            }
        }
        Ok(problem) => format!("{}: {}", problem.title, problem.detail),
        Err(_) => format!("request failed with status {}: {}", status, body),
    };

    PipelineError::ValidationRejected {
        scenario_id,
        status,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        let config = ValidationConfig {
            base_url: "http://localhost:3002/api/v1/".to_string(),
            timeout_seconds: 5,
        };
        let validator = HttpScenarioValidator::new(&config).unwrap();
        assert_eq!(
            validator.endpoint(),
            "http://localhost:3002/api/v1/scenario-validation"
        );
    }

    #[test]
    fn test_validation_failed_body() {
        let body = r#"{"type":"validation-failed","title":"Validation Failed","status":400,
            "detail":"The request contains invalid or missing fields","instance":"/x",
            "errors":[{"field":"ScenarioID","message":"is required","code":"required"}]}"#;
        let err = rejection_from_body(5, 400, body);
        let text = err.to_string();
        assert!(text.contains("Validation Failed"));
        assert!(text.contains("ScenarioID: is required"));
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_not_found_body() {
        let body = r#"{"type":"not-found","title":"Resource Not Found","status":404,
            "detail":"The requested scenario was not found","instance":"/x"}"#;
        let err = rejection_from_body(5, 404, body);
        assert!(err.to_string().contains("Resource Not Found"));
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_unstructured_body() {
        let err = rejection_from_body(5, 502, "bad gateway");
        assert!(err.to_string().contains("status 502"));
        assert!(err.to_string().contains("bad gateway"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let config = ValidationConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_seconds: 2,
        };
        let validator = HttpScenarioValidator::new(&config).unwrap();
        let err = validator.validate(1).await.unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }
}
