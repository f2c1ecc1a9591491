//! Typed inventory and order entities over the record store.
//!
//! This crate provides:
//! - `Item` and `Order` entities with their validation rules
//! - The record key layout shared by every entity and index
//! - Repositories whose writes are guarded conditional updates
//! - The reservation ledger, written in one transaction with the stock it
//!   takes or gives back

pub mod error;
pub mod index;
pub mod inventory;
pub mod keys;
pub mod order;
pub mod value_objects;

pub use error::{DomainError, Result};
pub use index::RebuildReport;
pub use inventory::{
    Item, ItemChanges, ItemRepository, NewItem, Reservation, ReservationRepository,
    ReservationState, ReserveOutcome, RestoreOutcome,
};
pub use order::{NewOrder, NewOrderLine, Order, OrderItem, OrderRepository, OrderStatus};
pub use value_objects::{Money, MoneyError};
