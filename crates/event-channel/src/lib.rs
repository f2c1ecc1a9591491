//! Event channel connecting the inventory and order saga participants.
//!
//! Carries the [`EventEnvelope`] wire payload with at-least-once delivery,
//! ordered per `orderId`, and bounded redelivery before an event is parked.

pub mod channel;
pub mod config;
pub mod consumer;
pub mod error;
pub mod event;
pub mod memory;

pub use channel::{
    Delivery, EventChannel, EventPublisher, EventPublisherExt, NackOutcome, ParkedEvent,
    PublishedEvent,
};
pub use config::ChannelConfig;
pub use consumer::{Consumer, DeliveryOutcome, EventHandler};
pub use error::{ChannelError, Result};
pub use event::{EventContract, EventEnvelope, EventType};
pub use memory::InMemoryEventChannel;
