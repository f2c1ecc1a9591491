use common::ErrorKind;
use thiserror::Error;

use crate::RecordKey;

/// Errors that can occur when interacting with the record store.
#[derive(Debug, Error)]
pub enum RecordStoreError {
    /// A conditional write found the record absent or its preconditions unmet.
    #[error("Precondition failed for record {key}")]
    PreconditionFailed { key: RecordKey },

    /// An update could not be applied to the stored attributes.
    #[error("Invalid update on {key} at '{path}': {reason}")]
    InvalidUpdate {
        key: RecordKey,
        path: String,
        reason: String,
    },

    /// The configured table name is not a safe SQL identifier.
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    /// The store could not be reached.
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RecordStoreError {
    /// Returns true if the error was caused by a failed precondition.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, RecordStoreError::PreconditionFailed { .. })
    }

    /// Returns true if retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecordStoreError::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            RecordStoreError::InvalidUpdate { .. }
            | RecordStoreError::InvalidTableName(_)
            | RecordStoreError::Serialization(_) => ErrorKind::Validation,
            RecordStoreError::Unavailable(_) | RecordStoreError::Database(_) => {
                ErrorKind::Transient
            }
        }
    }
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, RecordStoreError>;
