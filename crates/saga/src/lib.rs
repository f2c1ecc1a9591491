//! Choreographed reservation saga between inventory and orders.
//!
//! Two stateless participants react to each other's events:
//! 1. Orders publish `ORDER_CREATED` / `ORDER_CANCELLED`
//! 2. Inventory reserves or restores stock and publishes the outcome
//! 3. Orders confirm, or cancel and request compensation
//!
//! Correctness rests on conditional writes in the record store, not on
//! message deduplication, so any number of consumers may run.

pub mod config;
pub mod error;
pub mod inventory;
pub mod order;
pub mod runner;

pub use config::{RestorePolicy, SagaConfig, UnknownRestorePolicy};
pub use error::SagaError;
pub use inventory::InventoryParticipant;
pub use order::OrderParticipant;
pub use runner::SagaRunner;

/// Source attached to outcome events.
pub const INVENTORY_SOURCE: &str = "inventory.service";

/// Source attached to lifecycle events.
pub const ORDERS_SOURCE: &str = "orders.service";
