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

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metric names with a dedicated export column, in column order
pub const KNOWN_METRICS: [&str; 8] = [
    "acc_x", "acc_y", "acc_z", "gyro_x", "gyro_y", "gyro_z", "curr_v", "temp",
];

/// Text layout of the batch timestamp stamped by the gateway (UTC, microseconds)
pub const BATCH_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Problem type reported by the validation endpoint for rejected requests
pub const PROBLEM_TYPE_VALIDATION_FAILED: &str = "validation-failed";

pub fn format_batch_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(BATCH_TIMESTAMP_FORMAT).to_string()
}

pub fn parse_batch_timestamp(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, BATCH_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Position of a metric in the export column list
pub fn known_metric_index(name: &str) -> Option<usize> {
    KNOWN_METRICS.iter().position(|m| *m == name)
}

/// Body published by a device on `device/<id>/raw`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDevicePayload {
    pub data: HashMap<String, Vec<f64>>,
    pub device_id: i64,
    pub scenario_id: i64,
}

impl RawDevicePayload {
    /// Convert the channel map into the canonical record list.
    ///
    /// Known metrics come first in column order, other channels follow sorted by name.
    pub fn into_channels(self) -> Vec<ChannelData> {
        let mut channels: Vec<ChannelData> = self
            .data
            .into_iter()
            .map(|(channel_name, values)| ChannelData {
                channel_name,
                values,
            })
            .collect();

        channels.sort_by(|a, b| {
            let rank_a = known_metric_index(&a.channel_name).unwrap_or(KNOWN_METRICS.len());
            let rank_b = known_metric_index(&b.channel_name).unwrap_or(KNOWN_METRICS.len());
            rank_a
                .cmp(&rank_b)
                .then_with(|| a.channel_name.cmp(&b.channel_name))
        });
        channels
    }
}

/// One channel of a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    pub channel_name: String,
    pub values: Vec<f64>,
}

/// Envelope carried on the durable log between gateway and transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEnvelope {
    pub data: Vec<ChannelData>,
    pub device_id: i64,
    pub scenario_id: i64,
    pub timestamp: String,
    pub frame_id: u64,
}

impl SensorEnvelope {
    /// Total number of scalar samples across all channels
    pub fn sample_count(&self) -> usize {
        self.data.iter().map(|c| c.values.len()).sum()
    }
}

/// Export trigger published on the notification topic
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportNotification {
    pub scenario_id: i64,
}

/// Body sent to the validation endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub scenario_id: i64,
}

/// Field-level entry of a validation failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(default)]
    pub code: String,
}

/// RFC 7807 problem details, used both for upstream validation errors and our own replies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ProblemDetails {
    pub fn new(status: u16, problem_type: &str, title: &str, detail: String, instance: &str) -> Self {
        Self {
            problem_type: problem_type.to_string(),
            title: title.to_string(),
            status,
            detail,
            instance: instance.to_string(),
            errors: None,
        }
    }
}

/// Successful reply to a synchronous export request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub message: String,
    pub scenario_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
}
