//! Order side of the reservation saga.
//!
//! ```text
//! INVENTORY_UPDATED      ──► mark line reserved ──► (all lines) PENDING → CONFIRMED
//! INSUFFICIENT_INVENTORY ──► PENDING → CANCELLED ──► ORDER_CANCELLED per line
//!                            (already CANCELLED) ──► ORDER_CANCELLED per line
//! INVENTORY_RESTORED     ──► acknowledged
//! ```

use async_trait::async_trait;
use common::OrderId;
use domain::{Order, OrderRepository, OrderStatus};
use event_channel::{EventEnvelope, EventHandler, EventPublisher, EventPublisherExt, EventType};
use record_store::RecordStore;

use crate::{ORDERS_SOURCE, SagaError, error::Result};

const INTERESTS: [EventType; 3] = [
    EventType::InventoryUpdated,
    EventType::InsufficientInventory,
    EventType::InventoryRestored,
];

/// Advances orders in response to inventory outcome events.
///
/// Every status change is conditional on the order still being PENDING, so
/// stale and duplicate outcomes never regress an order. A rejection for an
/// already-cancelled order re-requests compensation.
pub struct OrderParticipant<S: RecordStore, P> {
    orders: OrderRepository<S>,
    publisher: P,
}

impl<S, P> OrderParticipant<S, P>
where
    S: RecordStore,
    P: EventPublisher,
{
    pub const SUBSCRIPTION: &'static str = "order-saga";

    pub fn new(store: S, publisher: P) -> Self {
        Self {
            orders: OrderRepository::new(store),
            publisher,
        }
    }

    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id, item_id = %event.item_id))]
    async fn on_reserved(&self, event: &EventEnvelope) -> Result<()> {
        let order = match self
            .orders
            .mark_reserved(&event.order_id, &event.item_id)
            .await
        {
            Ok(order) => order,
            Err(e) if e.is_precondition_failed() => return self.stale(&event.order_id).await,
            Err(e) => return Err(e.into()),
        };

        if order.line_for(&event.item_id).is_none() {
            tracing::warn!("reserved item is not a line of this order");
        }
        if !order.fully_reserved() {
            tracing::info!(
                reserved = order.reserved_items.len(),
                lines = order.items.len(),
                "line reserved; awaiting remaining lines"
            );
            return Ok(());
        }

        match self
            .orders
            .transition(&order.id, OrderStatus::Pending, OrderStatus::Confirmed)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_precondition_failed() => self.stale(&order.id).await,
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id, item_id = %event.item_id))]
    async fn on_insufficient(&self, event: &EventEnvelope) -> Result<()> {
        let order = match self
            .orders
            .transition(&event.order_id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await
        {
            Ok(order) => order,
            Err(e) if e.is_precondition_failed() => {
                return self.after_lost_cancel(&event.order_id).await;
            }
            Err(e) => return Err(e.into()),
        };

        self.compensate(&order).await
    }

    /// Handles a rejection for an order that is no longer PENDING.
    ///
    /// A CANCELLED order may be one whose compensation failed to publish on
    /// an earlier delivery, so its compensation is requested again. Restores
    /// are conditioned on the reservation ledger, which makes the repeat
    /// harmless.
    async fn after_lost_cancel(&self, order_id: &OrderId) -> Result<()> {
        match self.orders.get(order_id).await? {
            Some(order) if order.status == OrderStatus::Cancelled => {
                tracing::warn!("order already cancelled; re-requesting compensation");
                self.compensate(&order).await
            }
            current => {
                explain_stale(current.as_ref());
                Ok(())
            }
        }
    }

    /// Publishes `ORDER_CANCELLED` for every line so reserved lines get their
    /// stock back.
    async fn compensate(&self, order: &Order) -> Result<()> {
        for line in &order.items {
            let envelope = EventEnvelope::new(
                EventType::OrderCancelled,
                order.id.clone(),
                line.item_id.clone(),
                line.quantity,
            );
            self.publisher.publish(ORDERS_SOURCE, &envelope).await?;
        }
        tracing::info!(lines = order.items.len(), "compensation requested");
        Ok(())
    }

    /// Explains why a conditional status change did not apply.
    async fn stale(&self, order_id: &OrderId) -> Result<()> {
        explain_stale(self.orders.get(order_id).await?.as_ref());
        Ok(())
    }
}

fn explain_stale(order: Option<&Order>) {
    match order {
        Some(order) => tracing::warn!(
            status = %order.status,
            "order is no longer pending; outcome ignored"
        ),
        None => tracing::warn!("outcome for unknown order ignored"),
    }
}

#[async_trait]
impl<S, P> EventHandler for OrderParticipant<S, P>
where
    S: RecordStore,
    P: EventPublisher,
{
    type Error = SagaError;

    fn name(&self) -> &str {
        Self::SUBSCRIPTION
    }

    fn interests(&self) -> &[EventType] {
        &INTERESTS
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        match event.event_type {
            EventType::InventoryUpdated => self.on_reserved(event).await,
            EventType::InsufficientInventory => self.on_insufficient(event).await,
            EventType::InventoryRestored => {
                tracing::info!(
                    order_id = %event.order_id,
                    item_id = %event.item_id,
                    quantity = event.quantity,
                    "stock restored for cancelled order"
                );
                Ok(())
            }
            other => {
                tracing::debug!(event_type = %other, "event not handled by orders");
                Ok(())
            }
        }
    }
}
