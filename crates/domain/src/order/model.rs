//! Order entity and its creation input.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use common::{CustomerId, ItemId, OrderId, OrderItemId};
use serde::{Deserialize, Serialize};

use super::OrderStatus;
use crate::{DomainError, Money, Result};

/// A line of an order. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub quantity: u32,
    /// Item price captured when the order was created.
    pub unit_price: Money,
}

impl OrderItem {
    /// Returns the total price for this line (quantity * unit_price).
    pub fn total_price(&self) -> Result<Money> {
        Ok(self.unit_price.multiply(self.quantity)?)
    }
}

/// An order as stored under `ORDER#<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    /// Items whose reservation has been reported by inventory.
    #[serde(default)]
    pub reserved_items: BTreeMap<ItemId, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns true once every line has been reserved.
    pub fn fully_reserved(&self) -> bool {
        self.items
            .iter()
            .all(|line| self.reserved_items.get(&line.item_id).copied().unwrap_or(false))
    }

    /// Returns the line for an item, if the order contains it.
    pub fn line_for(&self, item_id: &ItemId) -> Option<&OrderItem> {
        self.items.iter().find(|line| &line.item_id == item_id)
    }
}

/// One requested line of a new order, priced at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub item_id: ItemId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Input for creating an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub lines: Vec<NewOrderLine>,
}

impl NewOrder {
    /// Checks the order-level rules: at least one line, positive quantities,
    /// one line per item.
    pub fn validate(&self) -> Result<()> {
        if self.customer_id.as_str().trim().is_empty() {
            return Err(DomainError::validation("customerId must not be empty"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }

        let mut seen = HashSet::new();
        for line in &self.lines {
            if line.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "quantity for item {} must be greater than 0",
                    line.item_id
                )));
            }
            if !seen.insert(&line.item_id) {
                return Err(DomainError::validation(format!(
                    "item {} appears more than once",
                    line.item_id
                )));
            }
        }
        Ok(())
    }

    /// Builds the PENDING order with fresh ids and a computed total.
    pub fn into_order(self, now: DateTime<Utc>) -> Result<Order> {
        self.validate()?;

        let order_id = OrderId::generate();
        let items: Vec<OrderItem> = self
            .lines
            .into_iter()
            .map(|line| OrderItem {
                id: OrderItemId::generate(),
                order_id: order_id.clone(),
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();
        let line_totals = items
            .iter()
            .map(OrderItem::total_price)
            .collect::<Result<Vec<_>>>()?;
        let total_amount = Money::total(line_totals)?;

        Ok(Order {
            id: order_id,
            customer_id: self.customer_id,
            status: OrderStatus::Pending,
            items,
            total_amount,
            reserved_items: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        })
    }
}
