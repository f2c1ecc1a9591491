//! Domain error types.

use common::{ErrorKind, ItemId};
use record_store::RecordStoreError;
use thiserror::Error;

use crate::order::OrderStatus;
use crate::value_objects::MoneyError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the record store.
    #[error("Record store error: {0}")]
    Store(#[from] RecordStoreError),

    /// Input violated a domain rule.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// An amount could not be represented as money.
    #[error("Invalid amount: {0}")]
    Money(#[from] MoneyError),

    /// The order status cannot move as requested.
    #[error("Invalid status transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Restocking would push the item past the largest representable quantity.
    #[error("Restoring {quantity} units would overflow the stock of item {item_id}")]
    StockOverflow { item_id: ItemId, quantity: u32 },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Store(e) => e.kind(),
            DomainError::Validation(_)
            | DomainError::Money(_)
            | DomainError::InvalidTransition { .. }
            | DomainError::StockOverflow { .. }
            | DomainError::Serialization(_) => ErrorKind::Validation,
        }
    }

    /// Returns true if a conditional write lost to a concurrent change.
    pub fn is_precondition_failed(&self) -> bool {
        self.kind() == ErrorKind::PreconditionFailed
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use record_store::RecordKey;

    use super::*;

    #[test]
    fn store_errors_keep_their_kind() {
        let err: DomainError = RecordStoreError::PreconditionFailed {
            key: RecordKey::primary("ORDER#1"),
        }
        .into();
        assert!(err.is_precondition_failed());

        let err: DomainError = RecordStoreError::Unavailable("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn rule_violations_are_validation() {
        let err = DomainError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Cancelled,
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "Invalid status transition: cannot move order from SHIPPED to CANCELLED"
        );
    }
}
