//! Order persistence over the record store.

use std::collections::HashSet;

use chrono::Utc;
use common::{CustomerId, ItemId, OrderId};
use futures_util::future::try_join_all;
use record_store::{AttributePath, Condition, Mutation, RecordStore, RecordStoreExt};
use serde_json::json;

use super::{NewOrder, Order, OrderStatus};
use crate::index::{self, RebuildReport};
use crate::{DomainError, Result, keys};

const CUSTOMER_INDEX: &str = "customer";

/// Repository for orders and the customer index.
///
/// Status changes are conditional on the status the caller observed, so a
/// stale or duplicate request can never move an order backwards.
#[derive(Clone)]
pub struct OrderRepository<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> OrderRepository<S> {
    /// Creates a repository over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a PENDING order and its customer index entry.
    #[tracing::instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn create(&self, input: NewOrder) -> Result<Order> {
        let order = input.into_order(Utc::now())?;
        self.store
            .insert_entity(keys::order(&order.id), &order)
            .await?;

        index::write_entry(
            &self.store,
            CUSTOMER_INDEX,
            keys::customer_entry(&order.customer_id, &order.id),
            json!({ "orderId": order.id, "createdAt": order.created_at }),
        )
        .await;

        tracing::info!(order_id = %order.id, total = %order.total_amount, "order created");
        Ok(order)
    }

    /// Loads an order.
    pub async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        match self.store.get(&keys::order(id)).await? {
            Some(record) => Ok(Some(record.into_entity()?)),
            None => Ok(None),
        }
    }

    /// Lists orders, optionally for one customer and/or in one status.
    ///
    /// Orders come back oldest first, ties broken by id.
    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        customer_id: Option<&CustomerId>,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let mut orders = match customer_id {
            Some(customer_id) => self.list_for_customer(customer_id).await?,
            None => self.scan().await?,
        };

        if let Some(status) = status {
            orders.retain(|o| o.status == status);
        }
        orders.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(orders)
    }

    /// Moves an order from `expected` to `next`.
    ///
    /// Fails with `PreconditionFailed` if the order is absent or no longer in
    /// `expected`.
    #[tracing::instrument(skip(self), fields(order_id = %id))]
    pub async fn transition(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Order> {
        let record = self
            .store
            .conditional_update(
                &keys::order(id),
                Mutation::new()
                    .set("status", next.as_str())
                    .set("updatedAt", json!(Utc::now()))
                    .require(Condition::equals("status", expected.as_str())),
            )
            .await?;

        tracing::info!(from = %expected, to = %next, "order status changed");
        metrics::counter!("order_transitions_total", "to" => next.as_str()).increment(1);
        Ok(record.into_entity()?)
    }

    /// Records that inventory reserved `item_id` for a PENDING order.
    ///
    /// Fails with `PreconditionFailed` if the order is absent or has left
    /// PENDING.
    #[tracing::instrument(skip(self), fields(order_id = %id, item_id = %item_id))]
    pub async fn mark_reserved(&self, id: &OrderId, item_id: &ItemId) -> Result<Order> {
        let record = self
            .store
            .conditional_update(
                &keys::order(id),
                Mutation::new()
                    .set(
                        AttributePath::from_segments(["reservedItems", item_id.as_str()]),
                        true,
                    )
                    .set("updatedAt", json!(Utc::now()))
                    .require(Condition::equals("status", OrderStatus::Pending.as_str())),
            )
            .await?;
        Ok(record.into_entity()?)
    }

    /// Re-derives the customer index from the primary order records.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_customer_index(&self) -> Result<RebuildReport> {
        let orders = self.scan().await?;
        let mut report = RebuildReport::default();
        let mut expected = HashSet::new();

        for order in &orders {
            let key = keys::customer_entry(&order.customer_id, &order.id);
            self.store
                .put(
                    key.clone(),
                    json!({ "orderId": order.id, "createdAt": order.created_at }),
                )
                .await?;
            expected.insert(key);
            report.written += 1;
        }

        for entry in self.store.query_by_prefix(keys::CUSTOMER_INDEX_PREFIX).await? {
            if !expected.contains(&entry.key) {
                self.store.delete(&entry.key).await?;
                report.removed += 1;
            }
        }

        tracing::info!(
            written = report.written,
            removed = report.removed,
            "customer index rebuilt"
        );
        Ok(report)
    }

    async fn scan(&self) -> Result<Vec<Order>> {
        self.store
            .query_by_prefix(keys::ORDER_PREFIX)
            .await?
            .into_iter()
            .filter(|r| keys::is_primary(&r.key))
            .map(|r| r.into_entity().map_err(DomainError::from))
            .collect()
    }

    async fn list_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>> {
        let entries = self
            .store
            .query_partition(&keys::customer_partition(customer_id))
            .await?;

        let ids: Vec<OrderId> = entries
            .iter()
            .filter_map(|e| e.key.sort_key.strip_prefix(keys::ORDER_PREFIX))
            .map(OrderId::new)
            .collect();

        let orders = try_join_all(ids.iter().map(|id| self.get(id))).await?;
        Ok(orders
            .into_iter()
            .flatten()
            .filter(|o| &o.customer_id == customer_id)
            .collect())
    }
}
