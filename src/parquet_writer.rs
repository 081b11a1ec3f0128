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

//! Columnar file writer for exported scenarios.
//!
//! Every file has the same layout:
//!
//! | column      | type                           | nullable |
//! |-------------|--------------------------------|----------|
//! | `timestamp` | timestamp (microseconds, UTC)  | no       |
//! | `frame_id`  | uint64                         | no       |
//! | `acc_x` ... `temp` | float64                 | yes      |
//!
//! The metric columns follow [`KNOWN_METRICS`] order.

use arrow::array::{ArrayRef, Float64Array, TimestampMicrosecondArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::CompressionConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pivot::ExportRow;
use crate::protocol::KNOWN_METRICS;

/// Arrow schema shared by every export file
pub fn export_schema() -> SchemaRef {
    let mut fields = vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("frame_id", DataType::UInt64, false),
    ];
    fields.extend(
        KNOWN_METRICS
            .iter()
            .map(|metric| Field::new(*metric, DataType::Float64, true)),
    );
    Arc::new(Schema::new(fields))
}

/// Map the configured 0-4 level onto zstd's scale
fn zstd_level(level: u8) -> i32 {
    match level {
        0 => 1,
        1 => 3,
        2 => 5,
        3 => 10,
        _ => 19,
    }
}

pub fn compression_from_config(config: &CompressionConfig) -> PipelineResult<Compression> {
    match config.r#type.as_str() {
        "none" => Ok(Compression::UNCOMPRESSED),
        "snappy" => Ok(Compression::SNAPPY),
        "zstd" => Ok(Compression::ZSTD(ZstdLevel::try_new(zstd_level(config.level))?)),
        other => Err(PipelineError::Export(format!(
            "unsupported compression '{}'",
            other
        ))),
    }
}

/// Writes pivoted rows as a single-row-group parquet file
pub struct ParquetFileWriter {
    compression: Compression,
}

impl ParquetFileWriter {
    pub fn new(config: &CompressionConfig) -> PipelineResult<Self> {
        Ok(Self {
            compression: compression_from_config(config)?,
        })
    }

    fn writer_properties(&self) -> WriterProperties {
        let created_by = KeyValue {
            key: "created_by".to_string(),
            value: Some(concat!("sensor-pipeline ", env!("CARGO_PKG_VERSION")).to_string()),
        };
        WriterProperties::builder()
            .set_compression(self.compression)
            .set_key_value_metadata(Some(vec![created_by]))
            .build()
    }

    /// Build the single record batch for `rows`
    pub fn to_record_batch(rows: &[ExportRow]) -> PipelineResult<RecordBatch> {
        let timestamps = TimestampMicrosecondArray::from(
            rows.iter()
                .map(|r| r.timestamp.timestamp_micros())
                .collect::<Vec<_>>(),
        )
        .with_timezone("UTC");
        let frame_ids = UInt64Array::from(rows.iter().map(|r| r.frame_id).collect::<Vec<_>>());

        let mut columns: Vec<ArrayRef> = vec![Arc::new(timestamps), Arc::new(frame_ids)];
        for i in 0..KNOWN_METRICS.len() {
            let values = Float64Array::from(rows.iter().map(|r| r.values[i]).collect::<Vec<_>>());
            columns.push(Arc::new(values));
        }

        Ok(RecordBatch::try_new(export_schema(), columns)?)
    }

    /// Write `rows` to `path`, replacing any existing file.
    ///
    /// Blocking; callers on the async runtime should use `spawn_blocking`.
    pub fn write_file(&self, rows: &[ExportRow], path: &Path) -> PipelineResult<()> {
        if rows.is_empty() {
            return Err(PipelineError::Export("refusing to write an empty file".to_string()));
        }

        let batch = Self::to_record_batch(rows)?;
        let file = File::create(path)
            .map_err(|e| PipelineError::Export(format!("create {}: {}", path.display(), e)))?;

        let mut writer = ArrowWriter::try_new(file, export_schema(), Some(self.writer_properties()))?;
        writer.write(&batch)?;
        writer.close()?;

        debug!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }
}
