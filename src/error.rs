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

// Error taxonomy shared by the pipeline stages

use crate::protocol::ProblemDetails;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Payload could not be decoded
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Scenario is inactive or unknown
    #[error("scenario {scenario_id} rejected ({status}): {reason}")]
    ValidationRejected {
        scenario_id: i64,
        status: u16,
        reason: String,
    },

    /// Broker or HTTP transport failure
    #[error("transport error: {0}")]
    Transport(String),

    #[error("store error: {0}")]
    Store(String),

    /// Nothing stored for the requested scenario
    #[error("no samples to export for scenario {0}")]
    EmptyExport(i64),

    #[error("export error: {0}")]
    Export(String),

    #[error("object storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// Status reported to synchronous callers
    pub fn status(&self) -> u16 {
        match self {
            PipelineError::Malformed(_) => 400,
            PipelineError::ValidationRejected { status, .. } => *status,
            PipelineError::EmptyExport(_) => 404,
            _ => 500,
        }
    }

    fn problem_kind(&self) -> (&'static str, &'static str) {
        match self {
            PipelineError::Malformed(_) => ("bad-request", "Bad Request"),
            PipelineError::ValidationRejected { .. } => ("validation-failed", "Validation Failed"),
            PipelineError::EmptyExport(_) => ("not-found", "Resource Not Found"),
            _ => ("internal-error", "Internal Server Error"),
        }
    }

    /// Render as problem details for a reply on `instance`
    pub fn to_problem(&self, instance: &str) -> ProblemDetails {
        let (problem_type, title) = self.problem_kind();
        ProblemDetails::new(self.status(), problem_type, title, self.to_string(), instance)
    }
}

impl From<tokio_postgres::Error> for PipelineError {
    fn from(e: tokio_postgres::Error) -> Self {
        PipelineError::Store(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for PipelineError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        PipelineError::Store(e.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for PipelineError {
    fn from(e: rdkafka::error::KafkaError) -> Self {
        PipelineError::Transport(e.to_string())
    }
}

impl From<parquet::errors::ParquetError> for PipelineError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        PipelineError::Export(e.to_string())
    }
}

impl From<arrow::error::ArrowError> for PipelineError {
    fn from(e: arrow::error::ArrowError) -> Self {
        PipelineError::Export(e.to_string())
    }
}
