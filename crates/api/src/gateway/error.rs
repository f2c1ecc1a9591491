//! Gateway error types.

use std::time::Duration;

use common::{ErrorKind, ItemId};
use domain::DomainError;
use event_channel::ChannelError;
use thiserror::Error;

/// Errors returned by the mutation gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The field name is not one the gateway resolves.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// A required argument was not supplied.
    #[error("missing required argument '{0}'")]
    MissingArgument(String),

    /// An argument had the wrong shape or an illegal value.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// An order line names an item that does not exist.
    #[error("order references unknown item {0}")]
    UnknownItem(ItemId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The lifecycle event could not be published after the write.
    #[error("event could not be published: {0}")]
    Channel(#[from] ChannelError),

    #[error("request deadline of {0:?} exceeded")]
    Timeout(Duration),
}

impl GatewayError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        GatewayError::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::UnknownField(_)
            | GatewayError::MissingArgument(_)
            | GatewayError::InvalidArgument { .. }
            | GatewayError::UnknownItem(_) => ErrorKind::Validation,
            GatewayError::Domain(e) => e.kind(),
            GatewayError::Channel(e) => e.kind(),
            GatewayError::Timeout(_) => ErrorKind::Transient,
        }
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
