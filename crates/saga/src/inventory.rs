//! Inventory side of the reservation saga.
//!
//! ```text
//! ORDER_CREATED   ──► reserve stock ──┬──► INVENTORY_UPDATED
//!                                     └──► INSUFFICIENT_INVENTORY
//! ORDER_CANCELLED ──► restore stock ──────► INVENTORY_RESTORED
//! ```

use async_trait::async_trait;
use domain::{
    ItemRepository, Reservation, ReservationRepository, ReservationState, ReserveOutcome,
    RestoreOutcome,
};
use event_channel::{EventEnvelope, EventHandler, EventPublisher, EventPublisherExt, EventType};
use record_store::RecordStore;

use crate::{INVENTORY_SOURCE, RestorePolicy, SagaError, error::Result};

const INTERESTS: [EventType; 2] = [EventType::OrderCreated, EventType::OrderCancelled];

/// Reserves and restores stock in response to order lifecycle events.
///
/// Holds no state between events. Every stock change commits together with
/// its reservation row, and the ledger makes redelivery harmless.
pub struct InventoryParticipant<S: RecordStore, P> {
    items: ItemRepository<S>,
    reservations: ReservationRepository<S>,
    publisher: P,
    restore_policy: RestorePolicy,
}

impl<S, P> InventoryParticipant<S, P>
where
    S: RecordStore + Clone,
    P: EventPublisher,
{
    pub const SUBSCRIPTION: &'static str = "inventory-saga";

    pub fn new(store: S, publisher: P, restore_policy: RestorePolicy) -> Self {
        Self {
            items: ItemRepository::new(store.clone()),
            reservations: ReservationRepository::new(store),
            publisher,
            restore_policy,
        }
    }

    #[tracing::instrument(
        skip(self, event),
        fields(order_id = %event.order_id, item_id = %event.item_id, quantity = event.quantity)
    )]
    async fn on_order_created(&self, event: &EventEnvelope) -> Result<()> {
        if let Some(existing) = self
            .reservations
            .get(&event.order_id, &event.item_id)
            .await?
        {
            return self.on_duplicate(event, existing).await;
        }

        match self
            .reservations
            .reserve(&event.order_id, &event.item_id, event.quantity)
            .await?
        {
            ReserveOutcome::Reserved(item) => {
                tracing::info!(remaining = item.quantity, "stock reserved");
                metrics::counter!("inventory_reservations_total", "outcome" => "reserved")
                    .increment(1);
                self.publish(event.reply(EventType::InventoryUpdated)).await
            }
            ReserveOutcome::Insufficient => {
                tracing::warn!("insufficient stock; reservation rejected");
                metrics::counter!("inventory_reservations_total", "outcome" => "insufficient")
                    .increment(1);
                self.publish(event.reply(EventType::InsufficientInventory))
                    .await
            }
            // A concurrent delivery of the same event won the insert.
            ReserveOutcome::AlreadyRecorded(existing) => self.on_duplicate(event, existing).await,
        }
    }

    async fn on_duplicate(&self, event: &EventEnvelope, existing: Reservation) -> Result<()> {
        metrics::counter!("inventory_reservations_total", "outcome" => "duplicate").increment(1);
        match existing.state {
            ReservationState::Reserved => {
                tracing::warn!("reservation already recorded; re-publishing outcome");
                self.publish(
                    event
                        .reply(EventType::InventoryUpdated)
                        .with_quantity(existing.quantity),
                )
                .await
            }
            ReservationState::Released => {
                tracing::warn!("reservation already released; ignoring redelivery");
                Ok(())
            }
        }
    }

    #[tracing::instrument(
        skip(self, event),
        fields(
            order_id = %event.order_id,
            item_id = %event.item_id,
            policy = %self.restore_policy
        )
    )]
    async fn on_order_cancelled(&self, event: &EventEnvelope) -> Result<()> {
        match self.restore_policy {
            RestorePolicy::RequireReservation => self.restore_reserved(event).await,
            RestorePolicy::Unconditional => self.restore_unconditionally(event).await,
        }
    }

    async fn restore_reserved(&self, event: &EventEnvelope) -> Result<()> {
        let (reservation, item) = match self
            .reservations
            .restore(&event.order_id, &event.item_id)
            .await?
        {
            RestoreOutcome::Restored { reservation, item } => (reservation, item),
            RestoreOutcome::NothingReserved => {
                tracing::info!("no outstanding reservation; nothing to restore");
                metrics::counter!("inventory_restores_total", "outcome" => "skipped")
                    .increment(1);
                return Ok(());
            }
        };

        match item {
            Some(item) => tracing::info!(available = item.quantity, "stock restored"),
            None => tracing::warn!("item no longer exists; reservation released without restock"),
        }

        metrics::counter!("inventory_restores_total", "outcome" => "restored").increment(1);
        self.publish(
            event
                .reply(EventType::InventoryRestored)
                .with_quantity(reservation.quantity),
        )
        .await
    }

    async fn restore_unconditionally(&self, event: &EventEnvelope) -> Result<()> {
        match self.items.restore(&event.item_id, event.quantity).await? {
            Some(item) => tracing::info!(available = item.quantity, "stock restored"),
            None => tracing::warn!("item no longer exists; nothing restocked"),
        }
        // Keep the ledger truthful in case the policy is switched back.
        self.reservations
            .release(&event.order_id, &event.item_id)
            .await?;

        metrics::counter!("inventory_restores_total", "outcome" => "restored").increment(1);
        self.publish(event.reply(EventType::InventoryRestored)).await
    }

    async fn publish(&self, envelope: EventEnvelope) -> Result<()> {
        self.publisher.publish(INVENTORY_SOURCE, &envelope).await?;
        Ok(())
    }
}

#[async_trait]
impl<S, P> EventHandler for InventoryParticipant<S, P>
where
    S: RecordStore + Clone,
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
            EventType::OrderCreated => self.on_order_created(event).await,
            EventType::OrderCancelled => self.on_order_cancelled(event).await,
            other => {
                tracing::debug!(event_type = %other, "event not handled by inventory");
                Ok(())
            }
        }
    }
}
