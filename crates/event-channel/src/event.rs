use chrono::{DateTime, Utc};
use common::{ItemId, OrderId};
use serde::{Deserialize, Serialize};

/// Which side of the saga an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventContract {
    /// Changes of intent on the order side, consumed by inventory.
    Lifecycle,
    /// Results of inventory operations, consumed by orders.
    Outcome,
}

/// Every event type carried by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    OrderCreated,
    OrderCancelled,
    InventoryUpdated,
    InventoryRestored,
    InsufficientInventory,
}

impl EventType {
    /// Returns the wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderCreated => "ORDER_CREATED",
            EventType::OrderCancelled => "ORDER_CANCELLED",
            EventType::InventoryUpdated => "INVENTORY_UPDATED",
            EventType::InventoryRestored => "INVENTORY_RESTORED",
            EventType::InsufficientInventory => "INSUFFICIENT_INVENTORY",
        }
    }

    /// Returns the contract the event type belongs to.
    pub fn contract(&self) -> EventContract {
        match self {
            EventType::OrderCreated | EventType::OrderCancelled => EventContract::Lifecycle,
            EventType::InventoryUpdated
            | EventType::InventoryRestored
            | EventType::InsufficientInventory => EventContract::Outcome,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The transport payload: `{type, orderId, itemId, quantity, timestamp}`.
///
/// Immutable once published. Unknown keys are ignored on decode so producers
/// can add fields without breaking consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Creates an envelope stamped with the current time.
    pub fn new(event_type: EventType, order_id: OrderId, item_id: ItemId, quantity: u32) -> Self {
        Self {
            event_type,
            order_id,
            item_id,
            quantity,
            timestamp: Utc::now(),
        }
    }

    /// Creates an envelope addressing the same reservation with another type.
    ///
    /// Used by participants answering an event: the reply keeps the order,
    /// item and quantity and gets a fresh emission time.
    pub fn reply(&self, event_type: EventType) -> Self {
        Self::new(
            event_type,
            self.order_id.clone(),
            self.item_id.clone(),
            self.quantity,
        )
    }

    /// Replaces the reply quantity.
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Encodes the envelope to its JSON wire form.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Decodes an envelope from its JSON wire form.
    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}
