//! Item persistence over the record store.

use std::collections::HashSet;

use chrono::Utc;
use common::ItemId;
use futures_util::future::try_join_all;
use record_store::{
    Condition, Mutation, RecordStore, RecordStoreError, RecordStoreExt,
};
use serde_json::json;

use super::{Item, ItemChanges, NewItem};
use crate::index::{self, RebuildReport};
use crate::{DomainError, Result, keys};

const CATEGORY_INDEX: &str = "category";

/// Repository for items and the category index.
///
/// Every stock change is a single guarded write, so concurrent changes
/// against one item can never overdraw it or push it past `u32::MAX`.
#[derive(Clone)]
pub struct ItemRepository<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> ItemRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates an item and, when it has a category, its index entry.
    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: NewItem) -> Result<Item> {
        let item = input.into_item(Utc::now())?;
        self.store.insert_entity(keys::item(&item.id), &item).await?;

        if item.is_categorized() {
            index::write_entry(
                &self.store,
                CATEGORY_INDEX,
                keys::category_entry(&item.category, &item.id),
                category_entry(&item),
            )
            .await;
        }

        tracing::info!(item_id = %item.id, quantity = item.quantity, "item created");
        Ok(item)
    }

    pub async fn get(&self, id: &ItemId) -> Result<Option<Item>> {
        match self.store.get(&keys::item(id)).await? {
            Some(record) => Ok(Some(record.into_entity()?)),
            None => Ok(None),
        }
    }

    /// Applies a partial update. Returns `None` if the item does not exist.
    ///
    /// A category change is conditional on the category read beforehand, and
    /// moves the index entry after the primary write.
    #[tracing::instrument(skip(self, changes), fields(item_id = %id))]
    pub async fn update(&self, id: &ItemId, changes: ItemChanges) -> Result<Option<Item>> {
        changes.validate()?;
        let Some(current) = self.get(id).await? else {
            return Ok(None);
        };

        let moved_from = changes
            .category
            .as_ref()
            .filter(|c| **c != current.category)
            .map(|_| current.category.clone());

        let mut mutation = Mutation::new().set("updatedAt", json!(Utc::now()));
        if let Some(name) = changes.name {
            mutation = mutation.set("name", name);
        }
        if let Some(description) = changes.description {
            mutation = mutation.set("description", description);
        }
        if let Some(sku) = changes.sku {
            mutation = mutation.set("sku", sku);
        }
        if let Some(quantity) = changes.quantity {
            mutation = mutation.set("quantity", quantity);
        }
        if let Some(unit_price) = changes.unit_price {
            mutation = mutation.set("unitPrice", f64::from(unit_price));
        }
        if let Some(category) = &changes.category {
            mutation = mutation.set("category", category.as_str());
        }
        if let Some(old) = &moved_from {
            mutation = mutation.require(Condition::equals("category", old.as_str()));
        }

        let record = match self.store.conditional_update(&keys::item(id), mutation).await {
            Ok(record) => record,
            // Deleted between the read and the write.
            Err(RecordStoreError::PreconditionFailed { .. }) if moved_from.is_none() => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let item: Item = record.into_entity()?;

        if let Some(old) = moved_from {
            if item.is_categorized() {
                index::write_entry(
                    &self.store,
                    CATEGORY_INDEX,
                    keys::category_entry(&item.category, &item.id),
                    category_entry(&item),
                )
                .await;
            }
            if !old.is_empty() {
                index::remove_entry(&self.store, CATEGORY_INDEX, keys::category_entry(&old, id))
                    .await;
            }
            tracing::info!(from = %old, to = %item.category, "item category changed");
        }

        Ok(Some(item))
    }

    /// Deletes an item and its index entry. Returns `None` if it did not exist.
    #[tracing::instrument(skip(self), fields(item_id = %id))]
    pub async fn delete(&self, id: &ItemId) -> Result<Option<Item>> {
        let Some(record) = self.store.delete(&keys::item(id)).await? else {
            return Ok(None);
        };
        let item: Item = record.into_entity()?;

        if item.is_categorized() {
            index::remove_entry(
                &self.store,
                CATEGORY_INDEX,
                keys::category_entry(&item.category, id),
            )
            .await;
        }

        tracing::info!("item deleted");
        Ok(Some(item))
    }

    /// Lists items, optionally restricted to one category.
    ///
    /// Items come back oldest first, ties broken by id.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, category: Option<&str>) -> Result<Vec<Item>> {
        let mut items = match category {
            Some(category) => self.list_in_category(category).await?,
            None => self.scan().await?,
        };
        items.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(items)
    }

    /// Puts `quantity` units back. Returns `None` if the item no longer exists.
    ///
    /// Fails with `StockOverflow` when the new total would not fit a `u32`.
    #[tracing::instrument(skip(self), fields(item_id = %id))]
    pub async fn restore(&self, id: &ItemId, quantity: u32) -> Result<Option<Item>> {
        let restored = self
            .store
            .try_update(&keys::item(id), restock(quantity))
            .await?;

        match restored {
            Some(record) => Ok(Some(record.into_entity()?)),
            None => match self.get(id).await? {
                Some(_) => Err(DomainError::StockOverflow {
                    item_id: id.clone(),
                    quantity,
                }),
                None => Ok(None),
            },
        }
    }

    /// Re-derives the category index from the primary item records.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_category_index(&self) -> Result<RebuildReport> {
        let items = self.scan().await?;
        let mut report = RebuildReport::default();
        let mut expected = HashSet::new();

        for item in items.iter().filter(|i| i.is_categorized()) {
            let key = keys::category_entry(&item.category, &item.id);
            self.store.put(key.clone(), category_entry(item)).await?;
            expected.insert(key);
            report.written += 1;
        }

        for entry in self.store.query_by_prefix(keys::CATEGORY_INDEX_PREFIX).await? {
            if !expected.contains(&entry.key) {
                self.store.delete(&entry.key).await?;
                report.removed += 1;
            }
        }

        tracing::info!(
            written = report.written,
            removed = report.removed,
            "category index rebuilt"
        );
        Ok(report)
    }

    async fn scan(&self) -> Result<Vec<Item>> {
        self.store
            .query_by_prefix(keys::ITEM_PREFIX)
            .await?
            .into_iter()
            .filter(|r| keys::is_primary(&r.key))
            .map(|r| r.into_entity().map_err(DomainError::from))
            .collect()
    }

    async fn list_in_category(&self, category: &str) -> Result<Vec<Item>> {
        let entries = self
            .store
            .query_partition(&keys::category_partition(category))
            .await?;

        let ids: Vec<ItemId> = entries
            .iter()
            .filter_map(|e| e.key.sort_key.strip_prefix(keys::ITEM_PREFIX))
            .map(ItemId::new)
            .collect();

        let items = try_join_all(ids.iter().map(|id| self.get(id))).await?;
        Ok(items
            .into_iter()
            .flatten()
            .filter(|i| i.category == category)
            .collect())
    }
}

/// Decrements stock by `quantity` if at least that many are on hand.
pub(crate) fn take(quantity: u32) -> Mutation {
    Mutation::new()
        .add("quantity", -i64::from(quantity))
        .set("updatedAt", json!(Utc::now()))
        .require(Condition::at_least("quantity", i64::from(quantity)))
}

/// Increments stock by `quantity` unless the total would exceed `u32::MAX`.
pub(crate) fn restock(quantity: u32) -> Mutation {
    Mutation::new()
        .add("quantity", i64::from(quantity))
        .set("updatedAt", json!(Utc::now()))
        .require(Condition::at_most(
            "quantity",
            i64::from(u32::MAX) - i64::from(quantity),
        ))
}

fn category_entry(item: &Item) -> serde_json::Value {
    json!({ "itemId": item.id, "createdAt": item.created_at })
}

#[cfg(test)]
mod tests {
    use record_store::InMemoryRecordStore;

    use super::*;
    use crate::Money;

    fn repo() -> ItemRepository<InMemoryRecordStore> {
        ItemRepository::new(InMemoryRecordStore::new())
    }

    fn widget(quantity: u32, category: &str) -> NewItem {
        NewItem {
            name: "Widget".into(),
            description: "A widget".into(),
            sku: None,
            quantity,
            unit_price: Money::from_cents(999),
            category: category.into(),
        }
    }

    #[tokio::test]
    async fn create_writes_category_index() {
        let repo = repo();
        let item = repo.create(widget(5, "tools")).await.unwrap();

        let entry = repo
            .store()
            .get(&keys::category_entry("tools", &item.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.attributes["itemId"], json!(item.id));

        let uncategorized = repo.create(widget(1, "")).await.unwrap();
        assert!(
            repo.store()
                .query_by_prefix(keys::CATEGORY_INDEX_PREFIX)
                .await
                .unwrap()
                .iter()
                .all(|r| !r.key.sort_key.ends_with(uncategorized.id.as_str()))
        );
    }

    #[tokio::test]
    async fn restore_adds_back() {
        let repo = repo();
        let item = repo.create(widget(5, "")).await.unwrap();

        let restored = repo.restore(&item.id, 3).await.unwrap().unwrap();
        assert_eq!(restored.quantity, 8);
        assert!(repo.restore(&ItemId::new("missing"), 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_never_exceeds_u32() {
        let repo = repo();
        let item = repo.create(widget(u32::MAX - 2, "")).await.unwrap();

        let err = repo.restore(&item.id, 3).await.unwrap_err();
        assert!(matches!(err, DomainError::StockOverflow { quantity: 3, .. }));
        assert_eq!(repo.get(&item.id).await.unwrap().unwrap().quantity, u32::MAX - 2);

        let full = repo.restore(&item.id, 2).await.unwrap().unwrap();
        assert_eq!(full.quantity, u32::MAX);
    }

    #[tokio::test]
    async fn update_is_partial_and_moves_category() {
        let repo = repo();
        let item = repo.create(widget(5, "tools")).await.unwrap();

        let updated = repo
            .update(
                &item.id,
                ItemChanges {
                    unit_price: Some(Money::from_cents(1250)),
                    category: Some("garden".into()),
                    sku: Some("W-1".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "Widget");
        assert_eq!(updated.quantity, 5);
        assert_eq!(updated.unit_price.cents(), 1250);
        assert_eq!(updated.sku.as_deref(), Some("W-1"));

        assert!(repo.list(Some("tools")).await.unwrap().is_empty());
        let garden = repo.list(Some("garden")).await.unwrap();
        assert_eq!(garden.len(), 1);
        assert_eq!(garden[0].id, item.id);
    }

    #[tokio::test]
    async fn update_missing_item_is_none() {
        let repo = repo();
        let result = repo
            .update(
                &ItemId::new("missing"),
                ItemChanges {
                    quantity: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn delete_removes_item_and_index() {
        let repo = repo();
        let item = repo.create(widget(5, "tools")).await.unwrap();

        let deleted = repo.delete(&item.id).await.unwrap().unwrap();
        assert_eq!(deleted.id, item.id);
        assert!(repo.get(&item.id).await.unwrap().is_none());
        assert!(repo.list(Some("tools")).await.unwrap().is_empty());

        assert!(repo.delete(&item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_ignores_index_rows_and_stale_entries() {
        let repo = repo();
        let a = repo.create(widget(1, "tools")).await.unwrap();
        let b = repo.create(widget(2, "toolsets")).await.unwrap();

        let all = repo.list(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let tools = repo.list(Some("tools")).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].id, a.id);

        repo.store()
            .put(
                keys::category_entry("tools", &ItemId::new("gone")),
                json!({"itemId": "gone"}),
            )
            .await
            .unwrap();
        repo.store()
            .put(keys::category_entry("tools", &b.id), json!({"itemId": b.id}))
            .await
            .unwrap();

        let tools = repo.list(Some("tools")).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].id, a.id);
    }

    #[tokio::test]
    async fn failed_index_write_is_repaired_by_rebuild() {
        let store = InMemoryRecordStore::new();
        let repo = ItemRepository::new(store.clone());
        store
            .fail_writes_with_prefix(Some(keys::CATEGORY_INDEX_PREFIX.to_string()))
            .await;

        let item = repo.create(widget(3, "tools")).await.unwrap();
        assert!(repo.get(&item.id).await.unwrap().is_some());
        assert!(repo.list(Some("tools")).await.unwrap().is_empty());

        store.fail_writes_with_prefix(None).await;
        store
            .put(
                keys::category_entry("tools", &ItemId::new("gone")),
                json!({"itemId": "gone"}),
            )
            .await
            .unwrap();

        let report = repo.rebuild_category_index().await.unwrap();
        assert_eq!(report, RebuildReport { written: 1, removed: 1 });
        assert_eq!(repo.list(Some("tools")).await.unwrap().len(), 1);
    }
}
