//! Order admission.
//!
//! Admission looks the product up, applies an advisory stock check
//! against that snapshot, persists the order and publishes the placement
//! fact. Publishing is acknowledged before admission reports success;
//! there is no outbox, so a publish failure after the save leaves a
//! persisted order whose fact never reached the log, and the caller sees
//! the error.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{BusError, FactPublisher, OrderPlacedFact};
use crate::clients::ProductLookup;

/// Errors from the order store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Order store unavailable: {0}")]
    Unavailable(String),
}

/// An incoming request to place an order.
#[derive(Debug, Clone, Copy)]
pub struct OrderRequest {
    pub product_id: i32,
    pub quantity: i32,
}

/// A persisted order.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: Uuid,
    pub product_id: i32,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(request: OrderRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: request.product_id,
            quantity: request.quantity,
            created_at: Utc::now(),
        }
    }
}

/// Why admission turned a request away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The product does not exist or could not be resolved.
    ProductUnavailable,
    /// The product's stock at lookup time was below the requested
    /// quantity. Advisory only; stock may have changed since.
    InsufficientStock,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::ProductUnavailable => "product unavailable",
            RejectReason::InsufficientStock => "insufficient stock",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an admission attempt that completed without infrastructure
/// failure.
#[derive(Debug, Clone)]
pub enum Placement {
    Accepted(Order),
    Rejected(RejectReason),
}

/// Infrastructure failures during admission.
#[derive(Debug, thiserror::Error)]
pub enum PlaceOrderError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] BusError),
}

/// Persistence for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn save(&self, order: &Order) -> Result<(), StoreError>;
    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
}

/// In-memory order store.
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
    fail_on_save: RwLock<bool>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            fail_on_save: RwLock::new(false),
        }
    }

    /// Make every subsequent save fail. For tests.
    pub async fn set_fail_on_save(&self, fail: bool) {
        *self.fail_on_save.write().await = fail;
    }

    pub async fn count(&self) -> usize {
        self.orders.read().await.len()
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        if *self.fail_on_save.read().await {
            return Err(StoreError::Unavailable("simulated failure".to_string()));
        }
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }
}

/// Order admission workflow.
pub struct OrderService<L, S, P> {
    lookup: Arc<L>,
    store: Arc<S>,
    publisher: Arc<P>,
}

impl<L, S, P> OrderService<L, S, P>
where
    L: ProductLookup,
    S: OrderStore,
    P: FactPublisher,
{
    pub fn new(lookup: Arc<L>, store: Arc<S>, publisher: Arc<P>) -> Self {
        Self {
            lookup,
            store,
            publisher,
        }
    }

    /// Admit an order.
    ///
    /// A lookup failure of any kind rejects the order rather than
    /// surfacing the infrastructure error; the stock check compares
    /// against the snapshot and does not reserve anything.
    pub async fn place_order(&self, request: OrderRequest) -> Result<Placement, PlaceOrderError> {
        let snapshot = match self.lookup.lookup(request.product_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!(
                    product_id = request.product_id,
                    "Rejecting order for unknown product"
                );
                return Ok(Placement::Rejected(RejectReason::ProductUnavailable));
            }
            Err(e) => {
                warn!(
                    product_id = request.product_id,
                    error = %e,
                    "Rejecting order, product lookup failed"
                );
                return Ok(Placement::Rejected(RejectReason::ProductUnavailable));
            }
        };

        if snapshot.stock < request.quantity {
            info!(
                product_id = request.product_id,
                stock = snapshot.stock,
                requested = request.quantity,
                "Rejecting order, insufficient stock"
            );
            return Ok(Placement::Rejected(RejectReason::InsufficientStock));
        }

        let order = Order::new(request);
        self.store.save(&order).await?;

        let fact = OrderPlacedFact {
            product_id: order.product_id,
            quantity: order.quantity,
        };
        // The order row already exists at this point; a publish failure
        // surfaces to the caller and the fact is simply lost.
        self.publisher.publish(&fact).await?;

        info!(order_id = %order.id, product_id = order.product_id, "Order placed");
        Ok(Placement::Accepted(order))
    }
}
