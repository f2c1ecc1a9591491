//! Mutation gateway.
//!
//! The single entry point for writes and reads. Every call is validated,
//! applied to the record store, and for order-affecting mutations followed
//! by one lifecycle event per order line:
//!
//! ```text
//! createOrder ──► PENDING order ──► ORDER_CREATED   × lines
//! cancelOrder ──► CANCELLED     ──► ORDER_CANCELLED × lines
//! ```
//!
//! Events are published after the write. A publish failure is returned to
//! the caller as a transient error and the written state is kept.

pub mod arguments;
pub mod error;
pub mod request;

use std::time::{Duration, Instant};

use common::{CustomerId, ItemId, OrderId};
use domain::{
    DomainError, Item, ItemChanges, ItemRepository, NewItem, NewOrder, NewOrderLine, Order,
    OrderRepository, OrderStatus,
};
use event_channel::{EventEnvelope, EventPublisher, EventPublisherExt, EventType};
use futures_util::future::try_join_all;
use record_store::RecordStore;
use saga::ORDERS_SOURCE;
use serde::Serialize;
use serde_json::Value;

pub use error::{GatewayError, Result};
pub use request::{CreateOrderInput, FIELDS, GatewayRequest, OrderLineInput};

/// Gateway settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Deadline for one gateway call, store and channel work included.
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(10_000),
        }
    }
}

/// Validates calls, writes records and publishes lifecycle events.
pub struct MutationGateway<S: RecordStore, P> {
    items: ItemRepository<S>,
    orders: OrderRepository<S>,
    publisher: P,
    config: GatewayConfig,
}

impl<S, P> MutationGateway<S, P>
where
    S: RecordStore + Clone,
    P: EventPublisher,
{
    pub fn new(store: S, publisher: P, config: GatewayConfig) -> Self {
        Self {
            items: ItemRepository::new(store.clone()),
            orders: OrderRepository::new(store),
            publisher,
            config,
        }
    }

    /// Resolves one `(fieldName, arguments)` call to its JSON result.
    ///
    /// Absent entities resolve to `null`.
    #[tracing::instrument(skip_all, fields(field = %field))]
    pub async fn resolve(&self, field: &str, arguments: &Value) -> Result<Value> {
        let request = match GatewayRequest::parse(field, arguments) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "rejected gateway call");
                return Err(e);
            }
        };
        let field = request.field();
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.config.request_timeout, self.execute(request))
            .await
            .unwrap_or(Err(GatewayError::Timeout(self.config.request_timeout)));

        metrics::counter!("gateway_requests_total", "field" => field).increment(1);
        metrics::histogram!("gateway_request_duration_seconds", "field" => field)
            .record(started.elapsed().as_secs_f64());

        if let Err(e) = &outcome {
            tracing::warn!(error = %e, kind = %e.kind(), "gateway call failed");
        }
        outcome
    }

    async fn execute(&self, request: GatewayRequest) -> Result<Value> {
        match request {
            GatewayRequest::CreateItem(input) => to_data(self.create_item(input).await?),
            GatewayRequest::UpdateItem { id, changes } => {
                to_data(self.update_item(&id, changes).await?)
            }
            GatewayRequest::DeleteItem { id } => to_data(self.delete_item(&id).await?),
            GatewayRequest::GetItem { id } => to_data(self.get_item(&id).await?),
            GatewayRequest::ListItems { category } => {
                to_data(self.list_items(category.as_deref()).await?)
            }
            GatewayRequest::CreateOrder(input) => to_data(self.create_order(input).await?),
            GatewayRequest::UpdateOrderStatus { id, status } => {
                to_data(self.update_order_status(&id, status).await?)
            }
            GatewayRequest::CancelOrder { id } => to_data(self.cancel_order(&id).await?),
            GatewayRequest::GetOrder { id } => to_data(self.get_order(&id).await?),
            GatewayRequest::ListOrders {
                customer_id,
                status,
            } => to_data(self.list_orders(customer_id.as_ref(), status).await?),
        }
    }

    pub async fn create_item(&self, input: NewItem) -> Result<Item> {
        Ok(self.items.create(input).await?)
    }

    /// Applies a partial update. `None` when the item does not exist.
    pub async fn update_item(&self, id: &ItemId, changes: ItemChanges) -> Result<Option<Item>> {
        Ok(self.items.update(id, changes).await?)
    }

    /// Deletes an item, returning what was deleted. `None` when absent.
    pub async fn delete_item(&self, id: &ItemId) -> Result<Option<Item>> {
        Ok(self.items.delete(id).await?)
    }

    pub async fn get_item(&self, id: &ItemId) -> Result<Option<Item>> {
        Ok(self.items.get(id).await?)
    }

    pub async fn list_items(&self, category: Option<&str>) -> Result<Vec<Item>> {
        Ok(self.items.list(category).await?)
    }

    /// Places a PENDING order priced at the items' current prices, then asks
    /// inventory to reserve each line.
    #[tracing::instrument(skip(self, input), fields(customer_id = %input.customer_id, lines = input.lines.len()))]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<Order> {
        let priced = try_join_all(input.lines.into_iter().map(|line| async move {
            let Some(item) = self.items.get(&line.item_id).await? else {
                return Err(GatewayError::UnknownItem(line.item_id));
            };
            Ok::<_, GatewayError>(NewOrderLine {
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: item.unit_price,
            })
        }))
        .await?;

        let order = self
            .orders
            .create(NewOrder {
                customer_id: input.customer_id,
                lines: priced,
            })
            .await?;
        tracing::info!(order_id = %order.id, total = %order.total_amount, "order placed");

        self.announce(EventType::OrderCreated, &order).await?;
        Ok(order)
    }

    /// Cancels an order and asks inventory to give its stock back.
    ///
    /// Cancelling a CANCELLED order leaves it untouched but publishes its
    /// `ORDER_CANCELLED` events again, so a retry completes a cancellation
    /// whose events were lost. Restores are conditioned on the reservation
    /// ledger and never credit a line twice. `None` when the order does not
    /// exist.
    #[tracing::instrument(skip_all, fields(order_id = %id))]
    pub async fn cancel_order(&self, id: &OrderId) -> Result<Option<Order>> {
        let Some(order) = self.orders.get(id).await? else {
            return Ok(None);
        };

        let cancelled = match order.status {
            OrderStatus::Cancelled => {
                tracing::info!("order already cancelled; re-announcing");
                order
            }
            status if !status.can_cancel() => {
                return Err(DomainError::InvalidTransition {
                    from: status,
                    to: OrderStatus::Cancelled,
                }
                .into());
            }
            status => match self
                .orders
                .transition(id, status, OrderStatus::Cancelled)
                .await
            {
                Ok(cancelled) => cancelled,
                // Cancelled concurrently; announcing again is harmless.
                Err(e) if e.is_precondition_failed() => match self.orders.get(id).await? {
                    Some(current) if current.status == OrderStatus::Cancelled => current,
                    _ => return Err(e.into()),
                },
                Err(e) => return Err(e.into()),
            },
        };

        self.announce(EventType::OrderCancelled, &cancelled).await?;
        Ok(Some(cancelled))
    }

    /// Moves an order forward along its fulfilment path.
    ///
    /// A CANCELLED target is handled as [`cancel_order`](Self::cancel_order).
    /// Requesting the current status is a no-op. `None` when the order does
    /// not exist.
    #[tracing::instrument(skip_all, fields(order_id = %id, status = %status))]
    pub async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>> {
        if status == OrderStatus::Cancelled {
            return self.cancel_order(id).await;
        }
        let Some(order) = self.orders.get(id).await? else {
            return Ok(None);
        };
        if order.status == status {
            return Ok(Some(order));
        }
        if !order.status.can_advance_to(status) {
            return Err(DomainError::InvalidTransition {
                from: order.status,
                to: status,
            }
            .into());
        }
        Ok(Some(self.orders.transition(id, order.status, status).await?))
    }

    pub async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.orders.get(id).await?)
    }

    pub async fn list_orders(
        &self,
        customer_id: Option<&CustomerId>,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        Ok(self.orders.list(customer_id, status).await?)
    }

    /// Publishes one `event_type` event per order line.
    async fn announce(&self, event_type: EventType, order: &Order) -> Result<()> {
        for line in &order.items {
            let envelope = EventEnvelope::new(
                event_type,
                order.id.clone(),
                line.item_id.clone(),
                line.quantity,
            );
            if let Err(e) = self.publisher.publish(ORDERS_SOURCE, &envelope).await {
                tracing::error!(
                    order_id = %order.id,
                    item_id = %line.item_id,
                    event_type = %event_type,
                    error = %e,
                    "lifecycle event not published"
                );
                return Err(e.into());
            }
        }
        Ok(())
    }
}

fn to_data<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(DomainError::from)
        .map_err(GatewayError::from)
}
