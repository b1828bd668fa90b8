//! Orderflow - eventually consistent order/inventory coordination.
//!
//! Two independently owned halves cooperate through a durable event log:
//! the order side admits orders (remote stock lookup with retry and
//! circuit breaking, persistence, acknowledged fact publication) and the
//! inventory side consumes order-placement facts and applies the
//! corresponding stock decrements. Delivery is at-least-once; consumers
//! must tolerate duplicates.

pub mod auth;
pub mod bus;
pub mod clients;
pub mod config;
pub mod inventory;
pub mod orders;
pub mod resilience;
pub mod utils;
