use common::ErrorKind;
use thiserror::Error;

/// Errors that can occur when publishing to or consuming from the channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel could not be reached.
    #[error("Event channel unavailable: {0}")]
    Unavailable(String),

    /// No subscription is registered under the name.
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),

    /// The delivery was already settled or its lease was lost.
    #[error("Unknown delivery {delivery_id} on subscription {subscription}")]
    UnknownDelivery {
        subscription: String,
        delivery_id: u64,
    },

    /// A payload could not be encoded or decoded.
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl ChannelError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::Unavailable(_) => ErrorKind::Transient,
            ChannelError::UnknownSubscription(_) | ChannelError::UnknownDelivery { .. } => {
                ErrorKind::NotFound
            }
            ChannelError::Payload(_) => ErrorKind::Validation,
        }
    }
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
