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

//! Thin wrapper over the partitioned append-only log.
//!
//! Publishing goes through [`LogPublisher`] with a bounded write deadline.
//! Consuming goes through [`LogSource`], which hands out one record at a time
//! and only advances the consumer-group offset once the caller acks it, so a
//! restart replays anything that was in flight (at-least-once).

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Message, Offset, TopicPartitionList};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::KafkaConfig;
use crate::error::{PipelineError, PipelineResult};

/// One message read from the log
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait LogPublisher: Send + Sync {
    /// Append one message; fails if the broker does not confirm within the deadline
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> PipelineResult<()>;
}

#[async_trait]
pub trait LogSource: Send {
    /// Next record, or `None` once the source is exhausted
    async fn next_record(&mut self) -> PipelineResult<Option<LogRecord>>;

    /// Mark a record as processed so its offset can be committed
    async fn ack(&mut self, record: &LogRecord) -> PipelineResult<()>;
}

/// Kafka producer with a per-message write deadline
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> PipelineResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.publish_timeout_ms.to_string())
            .set("queue.buffering.max.ms", "0")
            .create()?;

        info!("Kafka producer connected to {}", config.brokers);

        Ok(Self {
            producer,
            timeout: config.publish_timeout(),
        })
    }
}

#[async_trait]
impl LogPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> PipelineResult<()> {
        let record = FutureRecord::to(topic).key(key).payload(&payload);

        self.producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map(|_| ())
            .map_err(|(e, _)| PipelineError::Transport(format!("publish to '{}' failed: {}", topic, e)))
    }
}

/// Consumer-group member reading one topic
pub struct KafkaSubscriber {
    consumer: StreamConsumer,
    topic: String,
    group_id: String,
}

impl KafkaSubscriber {
    pub fn new(config: &KafkaConfig, topic: &str, group_id: &str) -> PipelineResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .create()?;

        consumer.subscribe(&[topic])?;

        info!("Subscribed to '{}' as group '{}'", topic, group_id);

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            group_id: group_id.to_string(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

#[async_trait]
impl LogSource for KafkaSubscriber {
    async fn next_record(&mut self) -> PipelineResult<Option<LogRecord>> {
        let message = self.consumer.recv().await?;

        let record = LogRecord {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: message.payload().map(|p| p.to_vec()).unwrap_or_default(),
        };

        debug!(
            "Received record {}/{}@{} ({} bytes)",
            record.topic,
            record.partition,
            record.offset,
            record.payload.len()
        );

        Ok(Some(record))
    }

    async fn ack(&mut self, record: &LogRecord) -> PipelineResult<()> {
        // The stored offset is the next one to read
        let mut partitions = TopicPartitionList::new();
        partitions.add_partition_offset(
            &record.topic,
            record.partition,
            Offset::Offset(record.offset + 1),
        )?;
        self.consumer.store_offsets(&partitions)?;
        Ok(())
    }
}

/// In-process log keeping every published message, one partition per topic
#[derive(Clone, Default)]
pub struct MemoryLog {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published to `topic`, in append order
    pub fn records(&self, topic: &str) -> Vec<LogRecord> {
        self.lock()
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }

    /// Append a raw payload without going through a publisher
    pub fn push_raw(&self, topic: &str, payload: Vec<u8>) {
        let mut records = self.lock();
        let offset = records.iter().filter(|r| r.topic == topic).count() as i64;
        records.push(LogRecord {
            topic: topic.to_string(),
            partition: 0,
            offset,
            key: None,
            payload,
        });
    }

    /// Snapshot reader over the current contents of `topic`
    pub fn source(&self, topic: &str) -> MemorySource {
        MemorySource {
            pending: self.records(topic).into(),
            acked: Vec::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogRecord>> {
        // A poisoned lock only means another test thread panicked mid-push
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LogPublisher for MemoryLog {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> PipelineResult<()> {
        let mut records = self.lock();
        let offset = records.iter().filter(|r| r.topic == topic).count() as i64;
        records.push(LogRecord {
            topic: topic.to_string(),
            partition: 0,
            offset,
            key: Some(key.to_string()),
            payload,
        });
        Ok(())
    }
}

pub struct MemorySource {
    pending: VecDeque<LogRecord>,
    acked: Vec<i64>,
}

impl MemorySource {
    /// Offsets acked so far
    pub fn acked(&self) -> &[i64] {
        &self.acked
    }
}

#[async_trait]
impl LogSource for MemorySource {
    async fn next_record(&mut self) -> PipelineResult<Option<LogRecord>> {
        Ok(self.pending.pop_front())
    }

    async fn ack(&mut self, record: &LogRecord) -> PipelineResult<()> {
        self.acked.push(record.offset);
        Ok(())
    }
}
