//! In-process event log backed by a tokio channel.
//!
//! Stands in for the broker in tests and single-process deployments. A
//! single partition (0) with monotonically increasing offsets is enough
//! to exercise the publish/poll/commit contract.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use super::{BusError, FactPublisher, FactRecord, FactSource, OrderPlacedFact, Result};

/// Create a connected publisher/source pair over one in-process topic.
pub fn channel_topic() -> (ChannelFactPublisher, ChannelFactSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    let publisher = ChannelFactPublisher {
        tx,
        next_offset: Arc::new(AtomicI64::new(0)),
    };
    let source = ChannelFactSource {
        rx: Mutex::new(rx),
        committed: AtomicI64::new(-1),
    };
    (publisher, source)
}

/// Publishing end of an in-process topic.
#[derive(Clone)]
pub struct ChannelFactPublisher {
    tx: mpsc::UnboundedSender<FactRecord>,
    next_offset: Arc<AtomicI64>,
}

impl ChannelFactPublisher {
    /// Publish an arbitrary payload, bypassing serialization.
    ///
    /// Lets tests inject malformed records the way a foreign producer
    /// could.
    pub fn publish_raw(&self, key: Option<String>, payload: Vec<u8>) -> Result<()> {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let record = FactRecord {
            key,
            payload,
            partition: 0,
            offset,
        };
        self.tx
            .send(record)
            .map_err(|_| BusError::Publish("channel closed".to_string()))
    }
}

#[async_trait]
impl FactPublisher for ChannelFactPublisher {
    async fn publish(&self, fact: &OrderPlacedFact) -> Result<()> {
        let payload =
            serde_json::to_vec(fact).map_err(|e| BusError::Publish(e.to_string()))?;
        self.publish_raw(Some(fact.partition_key()), payload)
    }
}

/// Consuming end of an in-process topic.
pub struct ChannelFactSource {
    rx: Mutex<mpsc::UnboundedReceiver<FactRecord>>,
    committed: AtomicI64,
}

impl ChannelFactSource {
    /// Highest committed offset, or -1 when nothing has been committed.
    pub fn committed_offset(&self) -> i64 {
        self.committed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FactSource for ChannelFactSource {
    async fn poll(&self) -> Result<FactRecord> {
        self.rx.lock().await.recv().await.ok_or(BusError::Closed)
    }

    async fn commit(&self, record: &FactRecord) -> Result<()> {
        self.committed.fetch_max(record.offset, Ordering::SeqCst);
        Ok(())
    }
}
