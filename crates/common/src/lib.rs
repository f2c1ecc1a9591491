//! Identifier and error-classification types shared by every crate in the
//! workspace.

pub mod error;
pub mod types;

pub use error::ErrorKind;
pub use types::{CustomerId, ItemId, OrderId, OrderItemId};
