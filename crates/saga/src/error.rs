//! Saga error types.

use common::ErrorKind;
use domain::DomainError;
use event_channel::ChannelError;
use thiserror::Error;

/// Errors that leave an event for redelivery.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Domain or record store error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The outcome event could not be published.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl SagaError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::Domain(e) => e.kind(),
            SagaError::Channel(e) => e.kind(),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
