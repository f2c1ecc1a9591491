//! Key-addressed record store with conditional (optimistic) writes.
//!
//! Records live under a composite [`RecordKey`] (partition key + sort key) so
//! that different entity types, and the denormalized index rows that point at
//! them, share one address space. Every write bumps the record [`Version`];
//! [`Mutation`]s carry the preconditions that make a write atomic with the
//! check that guards it, and [`WriteOp`] batches commit several guarded
//! writes all-or-nothing.

pub mod error;
pub mod expression;
pub mod key;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::{RecordStoreError, Result};
pub use expression::{AttributePath, Condition, Mutation, Update, WriteOp};
pub use key::RecordKey;
pub use memory::InMemoryRecordStore;
pub use postgres::{PostgresRecordStore, validate_table_name};
pub use record::{Record, Version};
pub use store::{RecordStore, RecordStoreExt};
