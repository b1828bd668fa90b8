//! Durable event log connecting the order and inventory halves.
//!
//! Order admission publishes an [`OrderPlacedFact`] and only reports
//! success once the log has acknowledged it. The inventory side consumes
//! the same topic through a [`FactSource`], committing each record only
//! after it has been handled, so delivery is at-least-once.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;

pub use channel::{channel_topic, ChannelFactPublisher, ChannelFactSource};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaBusConfig, KafkaFactPublisher, KafkaFactSource};

/// Topic carrying order-placement facts.
pub const ORDERS_TOPIC: &str = "orders_topic";

/// Errors from the event log.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Poll error: {0}")]
    Poll(String),

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Event log closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, BusError>;

/// The fact recorded when an order is admitted.
///
/// Wire format is JSON with PascalCase field names, matching what the
/// inventory consumers already expect on `orders_topic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlacedFact {
    #[serde(rename = "ProductId")]
    pub product_id: i32,
    #[serde(rename = "Quantity")]
    pub quantity: i32,
}

impl OrderPlacedFact {
    /// Partition key for this fact.
    ///
    /// Keyed by product so all decrements for one product land on one
    /// partition and apply in order.
    pub fn partition_key(&self) -> String {
        self.product_id.to_string()
    }
}

/// A consumed record plus the position needed to commit it.
#[derive(Debug, Clone)]
pub struct FactRecord {
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

/// Publishes facts to the log, resolving once the log acknowledges.
#[async_trait]
pub trait FactPublisher: Send + Sync {
    async fn publish(&self, fact: &OrderPlacedFact) -> Result<()>;
}

/// Pull-based consumption from the log.
#[async_trait]
pub trait FactSource: Send + Sync {
    /// Wait for the next record. Returns [`BusError::Closed`] when the
    /// log has no more records to offer.
    async fn poll(&self) -> Result<FactRecord>;

    /// Mark `record` as handled so it is not redelivered to this group.
    async fn commit(&self, record: &FactRecord) -> Result<()>;
}
