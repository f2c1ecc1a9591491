//! Reservation ledger.
//!
//! A reservation row proves that stock was decremented for one
//! `(orderId, itemId)` pair. Restores are conditioned on it so compensation
//! can never credit stock that was not taken, and redelivered reservations
//! find it and never take stock twice.

use chrono::{DateTime, Utc};
use common::{ItemId, OrderId};
use record_store::{
    Condition, Mutation, RecordStore, RecordStoreError, RecordStoreExt, WriteOp,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Item;
use super::repository::{restock, take};
use crate::{DomainError, Result, keys};

/// State of a reservation.
///
/// ```text
/// RESERVED ──► RELEASED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationState {
    /// Stock is held for the order.
    Reserved,
    /// Stock was given back. Terminal.
    Released,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Reserved => "RESERVED",
            ReservationState::Released => "RELEASED",
        }
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(order_id: OrderId, item_id: ItemId, quantity: u32) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            item_id,
            quantity,
            state: ReservationState::Reserved,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of a stock reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Stock was decremented and the RESERVED row written; carries the item
    /// after the write.
    Reserved(Item),
    /// The item is absent or holds fewer units than requested. Nothing changed.
    Insufficient,
    /// The pair already has a reservation row. Nothing changed.
    AlreadyRecorded(Reservation),
}

/// Result of giving reserved stock back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The row moved to RELEASED. `item` is `None` when the item was deleted
    /// in the meantime and there was nothing to restock.
    Restored {
        reservation: Reservation,
        item: Option<Item>,
    },
    /// No RESERVED row exists for the pair. Nothing changed.
    NothingReserved,
}

/// Repository for reservation rows.
///
/// A row and the stock change it records are committed in one store
/// transaction, so a crash or timeout can never leave one without the other.
#[derive(Clone)]
pub struct ReservationRepository<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> ReservationRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn get(&self, order_id: &OrderId, item_id: &ItemId) -> Result<Option<Reservation>> {
        match self.store.get(&keys::reservation(order_id, item_id)).await? {
            Some(record) => Ok(Some(record.into_entity()?)),
            None => Ok(None),
        }
    }

    /// Takes `quantity` units of the item for the order and writes the
    /// RESERVED row, both or neither.
    #[tracing::instrument(skip(self), fields(order_id = %order_id, item_id = %item_id))]
    pub async fn reserve(
        &self,
        order_id: &OrderId,
        item_id: &ItemId,
        quantity: u32,
    ) -> Result<ReserveOutcome> {
        let ledger_key = keys::reservation(order_id, item_id);
        let reservation = Reservation::new(order_id.clone(), item_id.clone(), quantity);

        let result = self
            .store
            .transact(vec![
                WriteOp::insert(ledger_key.clone(), serde_json::to_value(&reservation)?),
                WriteOp::update(keys::item(item_id), take(quantity)),
            ])
            .await;

        match result {
            Ok(mut written) => match written.pop() {
                Some(record) => Ok(ReserveOutcome::Reserved(record.into_entity()?)),
                None => Err(DomainError::validation("reservation wrote no item record")),
            },
            Err(RecordStoreError::PreconditionFailed { key }) if key == ledger_key => {
                match self.get(order_id, item_id).await? {
                    Some(existing) => Ok(ReserveOutcome::AlreadyRecorded(existing)),
                    None => Err(RecordStoreError::PreconditionFailed { key }.into()),
                }
            }
            Err(RecordStoreError::PreconditionFailed { .. }) => Ok(ReserveOutcome::Insufficient),
            Err(e) => Err(e.into()),
        }
    }

    /// Moves the pair's reservation RESERVED → RELEASED and gives its
    /// reserved quantity back to the item, both or neither.
    ///
    /// If the item was deleted the row is still released so the reservation
    /// cannot be restored twice.
    #[tracing::instrument(skip(self), fields(order_id = %order_id, item_id = %item_id))]
    pub async fn restore(&self, order_id: &OrderId, item_id: &ItemId) -> Result<RestoreOutcome> {
        let Some(reservation) = self
            .get(order_id, item_id)
            .await?
            .filter(|r| r.state == ReservationState::Reserved)
        else {
            return Ok(RestoreOutcome::NothingReserved);
        };

        let ledger_key = keys::reservation(order_id, item_id);
        let result = self
            .store
            .transact(vec![
                WriteOp::update(ledger_key.clone(), release()),
                WriteOp::update(keys::item(item_id), restock(reservation.quantity)),
            ])
            .await;

        let err = match result {
            Ok(written) => {
                let mut records = written.into_iter();
                let (Some(released), Some(item)) = (records.next(), records.next()) else {
                    return Err(DomainError::validation("restore wrote an incomplete batch"));
                };
                return Ok(RestoreOutcome::Restored {
                    reservation: released.into_entity()?,
                    item: Some(item.into_entity()?),
                });
            }
            Err(e) => e,
        };

        match err {
            // Released concurrently.
            RecordStoreError::PreconditionFailed { key } if key == ledger_key => {
                Ok(RestoreOutcome::NothingReserved)
            }
            RecordStoreError::PreconditionFailed { key } => {
                if self.store.exists(&key).await? {
                    return Err(DomainError::StockOverflow {
                        item_id: item_id.clone(),
                        quantity: reservation.quantity,
                    });
                }
                Ok(match self.release(order_id, item_id).await? {
                    Some(reservation) => RestoreOutcome::Restored {
                        reservation,
                        item: None,
                    },
                    None => RestoreOutcome::NothingReserved,
                })
            }
            e => Err(e.into()),
        }
    }

    /// Moves a reservation RESERVED → RELEASED without touching stock.
    ///
    /// Returns `None` when there is nothing to release: the row is absent or
    /// was released already.
    #[tracing::instrument(skip(self), fields(order_id = %order_id, item_id = %item_id))]
    pub async fn release(
        &self,
        order_id: &OrderId,
        item_id: &ItemId,
    ) -> Result<Option<Reservation>> {
        let released = self
            .store
            .try_update(&keys::reservation(order_id, item_id), release())
            .await?;

        match released {
            Some(record) => Ok(Some(record.into_entity()?)),
            None => Ok(None),
        }
    }
}

fn release() -> Mutation {
    Mutation::new()
        .set("state", ReservationState::Released.as_str())
        .set("updatedAt", json!(Utc::now()))
        .require(Condition::equals(
            "state",
            ReservationState::Reserved.as_str(),
        ))
}
