//! Inventory item entity and its mutation inputs.

use chrono::{DateTime, Utc};
use common::ItemId;
use serde::{Deserialize, Serialize};

use crate::{DomainError, Money, Result};

/// An inventory item as stored under `ITEM#<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// Units on hand. Only reservations and administrative updates change it.
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Returns true if the item is listed under a category index partition.
    pub fn is_categorized(&self) -> bool {
        !self.category.is_empty()
    }
}

/// Input for creating an item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub category: String,
}

impl NewItem {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name must not be empty"));
        }
        Ok(())
    }

    pub(crate) fn into_item(self, now: DateTime<Utc>) -> Result<Item> {
        self.validate()?;
        Ok(Item {
            id: ItemId::generate(),
            name: self.name,
            description: self.description,
            sku: self.sku,
            quantity: self.quantity,
            unit_price: self.unit_price,
            category: self.category,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update of an item; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub quantity: Option<u32>,
    pub unit_price: Option<Money>,
    pub category: Option<String>,
}

impl ItemChanges {
    pub fn is_empty(&self) -> bool {
        self == &ItemChanges::default()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(DomainError::validation("name must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn new_item_requires_a_name() {
        let err = NewItem::default().validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let item = NewItem {
            name: "Widget".into(),
            quantity: 5,
            unit_price: Money::from_cents(999),
            ..Default::default()
        }
        .into_item(Utc::now())
        .unwrap();
        assert_eq!(item.created_at, item.updated_at);
        assert!(!item.is_categorized());
    }

    #[test]
    fn blank_name_change_is_rejected() {
        let changes = ItemChanges {
            name: Some("  ".into()),
            ..Default::default()
        };
        assert!(changes.validate().is_err());
        assert!(ItemChanges::default().is_empty());
    }

    #[test]
    fn sku_is_omitted_when_absent() {
        let item = NewItem {
            name: "Widget".into(),
            unit_price: Money::from_cents(150),
            category: "tools".into(),
            ..Default::default()
        }
        .into_item(Utc::now())
        .unwrap();

        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("sku").is_none());
        assert_eq!(json["unitPrice"], json!(1.5));
        assert_eq!(json["category"], "tools");

        let back: Item = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }
}
