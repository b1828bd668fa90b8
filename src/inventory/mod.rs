//! Inventory side of the pipeline.
//!
//! A consumer loop polls the event log, decodes each order-placement fact
//! and applies the stock decrement, committing the record afterwards.
//! Processing errors are logged and skipped so one bad record never
//! stalls the partition. Decrements are applied as-is: a replayed record
//! decrements again, and stock may go negative.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::{BusError, FactRecord, FactSource, OrderPlacedFact};

/// Errors from the inventory store.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Inventory store unavailable: {0}")]
    Store(String),
}

/// A product's stock level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryRecord {
    pub product_id: i32,
    pub stock: i32,
}

/// Persistence for stock levels.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn find(&self, product_id: i32) -> Result<Option<InventoryRecord>, InventoryError>;
    async fn save(&self, record: InventoryRecord) -> Result<(), InventoryError>;
}

/// In-memory inventory store.
pub struct InMemoryInventoryStore {
    records: RwLock<HashMap<i32, i32>>,
    fail_on_save: RwLock<bool>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            fail_on_save: RwLock::new(false),
        }
    }

    /// Seed the store with initial stock levels.
    pub async fn with_stock(levels: &[(i32, i32)]) -> Self {
        let store = Self::new();
        {
            let mut records = store.records.write().await;
            for &(product_id, stock) in levels {
                records.insert(product_id, stock);
            }
        }
        store
    }

    /// Current stock for a product, if known.
    pub async fn stock(&self, product_id: i32) -> Option<i32> {
        self.records.read().await.get(&product_id).copied()
    }

    /// Make every subsequent save fail. For tests.
    pub async fn set_fail_on_save(&self, fail: bool) {
        *self.fail_on_save.write().await = fail;
    }
}

impl Default for InMemoryInventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn find(&self, product_id: i32) -> Result<Option<InventoryRecord>, InventoryError> {
        Ok(self
            .records
            .read()
            .await
            .get(&product_id)
            .map(|&stock| InventoryRecord { product_id, stock }))
    }

    async fn save(&self, record: InventoryRecord) -> Result<(), InventoryError> {
        if *self.fail_on_save.read().await {
            return Err(InventoryError::Store("simulated failure".to_string()));
        }
        self.records
            .write()
            .await
            .insert(record.product_id, record.stock);
        Ok(())
    }
}

/// Applies order-placement facts to stock levels.
///
/// Each fact decrements stock by the ordered quantity. Unknown products
/// are skipped. There is no replay protection: the same fact applied
/// twice decrements twice.
pub struct StockApplier<S> {
    store: Arc<S>,
}

impl<S: InventoryStore> StockApplier<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn apply_decrement(&self, fact: &OrderPlacedFact) -> Result<(), InventoryError> {
        let record = match self.store.find(fact.product_id).await? {
            Some(record) => record,
            None => {
                warn!(
                    product_id = fact.product_id,
                    "Skipping decrement for unknown product"
                );
                return Ok(());
            }
        };

        let updated = InventoryRecord {
            product_id: record.product_id,
            stock: record.stock - fact.quantity,
        };
        self.store.save(updated).await?;
        info!(
            product_id = fact.product_id,
            quantity = fact.quantity,
            stock = updated.stock,
            "Applied stock decrement"
        );
        Ok(())
    }
}

/// Lifecycle of the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// The consumer did not reach [`ConsumerState::Stopped`] in time.
#[derive(Debug, thiserror::Error)]
#[error("Consumer did not stop within {0:?}")]
pub struct StopTimeout(pub Duration);

/// Consumer loop binding a [`FactSource`] to a [`StockApplier`].
pub struct OrderConsumer<B, S> {
    source: B,
    applier: StockApplier<S>,
}

impl<B, S> OrderConsumer<B, S>
where
    B: FactSource + 'static,
    S: InventoryStore + 'static,
{
    pub fn new(source: B, applier: StockApplier<S>) -> Self {
        Self { source, applier }
    }

    /// Start the loop on a background task and return a handle for
    /// observing and stopping it.
    pub fn spawn(self) -> ConsumerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConsumerState::Starting);
        let task = tokio::spawn(self.run(shutdown_rx, state_tx));
        ConsumerHandle {
            shutdown: shutdown_tx,
            state: state_rx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>, state: watch::Sender<ConsumerState>) {
        let _ = state.send(ConsumerState::Running);
        info!("Consumer loop running");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    match changed {
                        Ok(()) if *shutdown.borrow() => break,
                        Ok(()) => continue,
                        // Handle dropped without a stop signal.
                        Err(_) => break,
                    }
                }
                polled = self.source.poll() => {
                    match polled {
                        Ok(record) => self.process(&record).await,
                        Err(BusError::Closed) => {
                            info!("Event log closed, stopping consumer");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "Poll failed");
                            continue;
                        }
                    }
                }
            }
        }

        let _ = state.send(ConsumerState::Stopping);
        info!("Consumer loop stopping");
        let _ = state.send(ConsumerState::Stopped);
    }

    /// Handle one record and commit it.
    ///
    /// Decode and apply errors are logged and the record is committed
    /// anyway, so a poison record is passed over rather than redelivered
    /// forever.
    async fn process(&self, record: &FactRecord) {
        match serde_json::from_slice::<OrderPlacedFact>(&record.payload) {
            Ok(fact) => {
                if let Err(e) = self.applier.apply_decrement(&fact).await {
                    error!(
                        offset = record.offset,
                        error = %e,
                        "Failed to apply decrement, skipping record"
                    );
                }
            }
            Err(e) => {
                error!(
                    offset = record.offset,
                    error = %e,
                    "Malformed record, skipping"
                );
            }
        }
        if let Err(e) = self.source.commit(record).await {
            error!(offset = record.offset, error = %e, "Commit failed");
        }
    }
}

/// Handle to a spawned consumer loop.
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<ConsumerState>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Signal shutdown and wait up to `timeout` for the loop to finish
    /// its in-flight record and exit.
    pub async fn stop(self, timeout: Duration) -> Result<(), StopTimeout> {
        let _ = self.shutdown.send(true);
        match tokio::time::timeout(timeout, self.task).await {
            Ok(_) => Ok(()),
            Err(_) => Err(StopTimeout(timeout)),
        }
    }
}
