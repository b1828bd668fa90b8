//! Kafka-backed event log.
//!
//! Producers publish with full-acknowledgment semantics and a bounded
//! wait, so order admission only succeeds once the broker has the fact.
//! Consumers join a named group with auto-commit disabled and commit each
//! offset explicitly after the record has been handled.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Message, Offset, TopicPartitionList};
use tracing::info;

use super::{BusError, FactPublisher, FactRecord, FactSource, OrderPlacedFact, Result};
use crate::config::MessagingConfig;

/// Connection settings for the Kafka event log.
#[derive(Debug, Clone)]
pub struct KafkaBusConfig {
    /// Broker bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Topic carrying order-placement facts.
    pub topic: String,
    /// Consumer group id. Required for subscribing, unused by publishers.
    pub group_id: Option<String>,
    /// Bound on the wait for broker acknowledgment of a publish.
    pub ack_timeout: Duration,
}

impl KafkaBusConfig {
    pub fn new(bootstrap_servers: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            topic: topic.into(),
            group_id: None,
            ack_timeout: Duration::from_secs(10),
        }
    }

    /// Build from the application messaging section.
    pub fn from_config(config: &MessagingConfig) -> Self {
        Self {
            bootstrap_servers: config.bootstrap_servers.clone(),
            topic: config.topic.clone(),
            group_id: Some(config.group_id.clone()),
            ack_timeout: config.ack_timeout(),
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Create a publisher for this topic.
    pub fn publisher(&self) -> Result<KafkaFactPublisher> {
        KafkaFactPublisher::new(self.clone())
    }

    /// Create a group subscriber for this topic.
    pub fn subscriber(&self) -> Result<KafkaFactSource> {
        KafkaFactSource::new(self.clone())
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("acks", "all")
            .set(
                "message.timeout.ms",
                self.ack_timeout.as_millis().to_string(),
            );
        config
    }

    fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest");
        config
    }
}

/// Publishes order-placement facts to Kafka.
pub struct KafkaFactPublisher {
    producer: FutureProducer,
    config: KafkaBusConfig,
}

impl KafkaFactPublisher {
    pub fn new(config: KafkaBusConfig) -> Result<Self> {
        let producer = config
            .producer_config()
            .create()
            .map_err(|e| BusError::Connection(e.to_string()))?;
        info!(
            topic = %config.topic,
            servers = %config.bootstrap_servers,
            "Created Kafka publisher"
        );
        Ok(Self { producer, config })
    }
}

#[async_trait]
impl FactPublisher for KafkaFactPublisher {
    async fn publish(&self, fact: &OrderPlacedFact) -> Result<()> {
        let payload =
            serde_json::to_vec(fact).map_err(|e| BusError::Publish(e.to_string()))?;
        let key = fact.partition_key();
        let record = FutureRecord::to(&self.config.topic)
            .key(&key)
            .payload(&payload);

        self.producer
            .send(record, Timeout::After(self.config.ack_timeout))
            .await
            .map_err(|(e, _)| BusError::Publish(e.to_string()))?;
        Ok(())
    }
}

/// Consumes order-placement facts from Kafka as part of a group.
pub struct KafkaFactSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaFactSource {
    pub fn new(config: KafkaBusConfig) -> Result<Self> {
        let group_id = config
            .group_id
            .as_deref()
            .ok_or_else(|| BusError::Connection("consumer requires a group id".to_string()))?;

        let consumer: StreamConsumer = config
            .consumer_config(group_id)
            .create()
            .map_err(|e| BusError::Connection(e.to_string()))?;
        consumer
            .subscribe(&[&config.topic])
            .map_err(|e| BusError::Connection(e.to_string()))?;
        info!(
            topic = %config.topic,
            group_id,
            "Subscribed Kafka consumer"
        );
        Ok(Self {
            consumer,
            topic: config.topic,
        })
    }
}

#[async_trait]
impl FactSource for KafkaFactSource {
    async fn poll(&self) -> Result<FactRecord> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BusError::Poll(e.to_string()))?;
        Ok(FactRecord {
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: message.payload().unwrap_or_default().to_vec(),
            partition: message.partition(),
            offset: message.offset(),
        })
    }

    async fn commit(&self, record: &FactRecord) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&self.topic, record.partition, Offset::Offset(record.offset + 1))
            .map_err(|e| BusError::Commit(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BusError::Commit(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
