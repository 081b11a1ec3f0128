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

// Long-to-wide reshaping of stored samples for export

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::protocol::{known_metric_index, KNOWN_METRICS};
use crate::store::ProcessedSample;

/// One wide row: every known metric observed at (frame_id, timestamp)
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
    /// Indexed like [`KNOWN_METRICS`]; `None` when the metric was not sampled
    pub values: [Option<f64>; KNOWN_METRICS.len()],
}

impl ExportRow {
    fn empty(frame_id: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            frame_id,
            timestamp,
            values: [None; KNOWN_METRICS.len()],
        }
    }

    pub fn value(&self, metric: &str) -> Option<f64> {
        known_metric_index(metric).and_then(|i| self.values[i])
    }
}

/// Group samples by (frame_id, timestamp) into wide rows.
///
/// Samples of unknown metrics are dropped. When the same key and metric
/// occur more than once, the later sample in input order wins. Output is
/// sorted by frame id, then timestamp.
pub fn pivot(samples: &[ProcessedSample]) -> Vec<ExportRow> {
    let mut rows: Vec<ExportRow> = Vec::new();
    let mut index: HashMap<(u64, DateTime<Utc>), usize> = HashMap::new();

    for sample in samples {
        let Some(column) = known_metric_index(&sample.metric_name) else {
            continue;
        };

        let key = (sample.frame_id, sample.timestamp);
        let slot = *index.entry(key).or_insert_with(|| {
            rows.push(ExportRow::empty(sample.frame_id, sample.timestamp));
            rows.len() - 1
        });
        rows[slot].values[column] = Some(sample.value);
    }

    rows.sort_by(|a, b| {
        a.frame_id
            .cmp(&b.frame_id)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample(frame_id: u64, metric: &str, value: f64, offset_ms: i64) -> ProcessedSample {
        ProcessedSample {
            device_id: 7,
            scenario_id: 19,
            frame_id,
            metric_name: metric.to_string(),
            value,
            timestamp: t0() + Duration::milliseconds(offset_ms),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_example_frame() {
        let samples = vec![
            sample(1, "acc_x", 1.0, 0),
            sample(1, "gyro_z", 3.0, 0),
            sample(1, "acc_x", 2.0, 2),
            sample(1, "gyro_z", 4.0, 2),
        ];

        let rows = pivot(&samples);
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].timestamp, t0());
        assert_eq!(rows[0].value("acc_x"), Some(1.0));
        assert_eq!(rows[0].value("gyro_z"), Some(3.0));
        assert_eq!(rows[0].value("temp"), None);

        assert_eq!(rows[1].timestamp, t0() + Duration::milliseconds(2));
        assert_eq!(rows[1].value("acc_x"), Some(2.0));
        assert_eq!(rows[1].value("gyro_z"), Some(4.0));
    }

    #[test]
    fn test_sorted_by_frame_then_timestamp() {
        // Frame 2 was stamped earlier than frame 1's late samples
        let samples = vec![
            sample(2, "temp", 20.0, 0),
            sample(1, "temp", 21.0, 4),
            sample(1, "temp", 22.0, 2),
        ];

        let keys: Vec<(u64, i64)> = pivot(&samples)
            .iter()
            .map(|r| (r.frame_id, (r.timestamp - t0()).num_milliseconds()))
            .collect();
        assert_eq!(keys, vec![(1, 2), (1, 4), (2, 0)]);
    }

    #[test]
    fn test_same_timestamp_different_frames_stay_apart() {
        let samples = vec![sample(1, "acc_x", 1.0, 0), sample(2, "acc_x", 5.0, 0)];
        let rows = pivot(&samples);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value("acc_x"), Some(1.0));
        assert_eq!(rows[1].value("acc_x"), Some(5.0));
    }

    #[test]
    fn test_unknown_metrics_ignored() {
        let samples = vec![sample(1, "humidity", 40.0, 0), sample(1, "curr_v", 3.3, 0)];
        let rows = pivot(&samples);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("curr_v"), Some(3.3));
        assert_eq!(rows[0].values.iter().filter(|v| v.is_some()).count(), 1);

        let only_unknown = vec![sample(1, "humidity", 40.0, 0)];
        assert!(pivot(&only_unknown).is_empty());
    }

    #[test]
    fn test_every_known_sample_lands_in_one_cell() {
        let mut samples = Vec::new();
        for frame in 1..=3u64 {
            for (i, metric) in KNOWN_METRICS.iter().enumerate() {
                for k in 0..4 {
                    let value = (frame * 100 + i as u64 * 10 + k) as f64;
                    samples.push(sample(frame, metric, value, k as i64 * 2));
                }
            }
        }

        let rows = pivot(&samples);
        assert_eq!(rows.len(), 3 * 4);
        for s in &samples {
            let row = rows
                .iter()
                .find(|r| r.frame_id == s.frame_id && r.timestamp == s.timestamp)
                .unwrap();
            assert_eq!(row.value(&s.metric_name), Some(s.value));
        }
    }

    #[test]
    fn test_deterministic() {
        let samples = vec![
            sample(3, "acc_y", 1.0, 0),
            sample(1, "acc_z", 2.0, 6),
            sample(2, "gyro_x", 3.0, 2),
        ];
        assert_eq!(pivot(&samples), pivot(&samples));
    }
}
