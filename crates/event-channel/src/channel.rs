//! Publish and consume contracts of the event channel.
//!
//! Delivery is **at-least-once** and **ordered per order id**: every
//! subscription is sharded into partitions by `orderId`, and a partition hands
//! out one delivery at a time until it is acked or nacked. A nacked delivery
//! stays at the head of its partition and is redelivered; once it has been
//! attempted `max_delivery_attempts` times it is parked instead.
//!
//! Consumers must be idempotent: the same event can arrive more than once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{EventEnvelope, EventType, Result};

/// An event as recorded in the channel's published log.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    /// Position in the published log, starting at 1.
    pub sequence: u64,
    pub bus_name: String,
    /// Logical producer, e.g. `orders.service`.
    pub source: String,
    /// The raw JSON payload as published.
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}

impl PublishedEvent {
    /// Returns the `type` field of the payload, if present.
    pub fn type_name(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }

    /// Returns the `orderId` field of the payload, if present.
    pub fn order_id(&self) -> Option<&str> {
        self.payload.get("orderId").and_then(Value::as_str)
    }

    /// Decodes the payload into a typed envelope.
    pub fn envelope(&self) -> Result<EventEnvelope> {
        Ok(EventEnvelope::from_json(self.payload.clone())?)
    }
}

/// One delivery attempt of an event to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: u64,
    pub subscription: String,
    pub partition: usize,
    /// 1 for the first delivery, incremented on every redelivery.
    pub attempt: u32,
    pub event: PublishedEvent,
}

/// An event whose delivery exhausted the retry budget.
#[derive(Debug, Clone, PartialEq)]
pub struct ParkedEvent {
    pub subscription: String,
    pub event: PublishedEvent,
    pub attempts: u32,
    /// Failure reason reported with the last nack.
    pub reason: String,
    pub parked_at: DateTime<Utc>,
}

/// What happened to a nacked delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// The event stays at the head of its partition for another attempt.
    Redelivering { attempt: u32 },
    /// The retry budget is spent; the event was moved aside.
    Parked { attempts: u32 },
}

/// Publishing side of the channel.
///
/// Publishing is fire-and-forget for the caller: a successful return means the
/// event is in the log and queued for every matching subscription.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes a raw JSON payload on behalf of `source`.
    ///
    /// Returns the sequence number assigned in the published log.
    async fn publish_raw(&self, source: &str, payload: Value) -> Result<u64>;
}

/// Extension trait providing typed publishing.
#[async_trait]
pub trait EventPublisherExt: EventPublisher {
    /// Publishes a typed envelope.
    async fn publish(&self, source: &str, envelope: &EventEnvelope) -> Result<u64> {
        let payload = envelope.to_json()?;
        self.publish_raw(source, payload).await
    }
}

impl<T: EventPublisher + ?Sized> EventPublisherExt for T {}

/// Consuming side of the channel.
#[async_trait]
pub trait EventChannel: EventPublisher {
    /// Registers a named subscription for the given event types.
    ///
    /// An empty `interests` list receives every event. Registering an existing
    /// name is a no-op, which is how several consumers compete for one
    /// subscription. Only events published after registration are delivered.
    async fn subscribe(&self, subscription: &str, interests: &[EventType]) -> Result<()>;

    /// Leases the next deliverable event, if any.
    async fn poll(&self, subscription: &str) -> Result<Option<Delivery>>;

    /// Settles a delivery as processed.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Settles a delivery as failed.
    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<NackOutcome>;

    /// Waits until work may be available on the subscription, or `max_wait`.
    async fn wait_for_work(&self, subscription: &str, max_wait: Duration);

    /// Lists parked events across all subscriptions.
    async fn parked(&self) -> Result<Vec<ParkedEvent>>;
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish_raw(&self, source: &str, payload: Value) -> Result<u64> {
        (**self).publish_raw(source, payload).await
    }
}

#[async_trait]
impl<T: EventChannel + ?Sized> EventChannel for Arc<T> {
    async fn subscribe(&self, subscription: &str, interests: &[EventType]) -> Result<()> {
        (**self).subscribe(subscription, interests).await
    }

    async fn poll(&self, subscription: &str) -> Result<Option<Delivery>> {
        (**self).poll(subscription).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        (**self).ack(delivery).await
    }

    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<NackOutcome> {
        (**self).nack(delivery, reason).await
    }

    async fn wait_for_work(&self, subscription: &str, max_wait: Duration) {
        (**self).wait_for_work(subscription, max_wait).await
    }

    async fn parked(&self) -> Result<Vec<ParkedEvent>> {
        (**self).parked().await
    }
}
