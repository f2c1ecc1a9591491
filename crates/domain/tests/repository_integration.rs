//! Integration tests for the item, order and reservation repositories.
//!
//! These tests run the repositories together over one store, the way the
//! gateway and the saga participants share it.

use common::{CustomerId, ItemId, OrderId};
use domain::{
    ItemChanges, ItemRepository, Money, NewItem, NewOrder, NewOrderLine, OrderRepository,
    OrderStatus, ReservationRepository, ReservationState, ReserveOutcome, RestoreOutcome, keys,
};
use record_store::{InMemoryRecordStore, RecordStore, RecordStoreExt};

struct Repos {
    store: InMemoryRecordStore,
    items: ItemRepository<InMemoryRecordStore>,
    orders: OrderRepository<InMemoryRecordStore>,
    reservations: ReservationRepository<InMemoryRecordStore>,
}

fn repos() -> Repos {
    let store = InMemoryRecordStore::new();
    Repos {
        items: ItemRepository::new(store.clone()),
        orders: OrderRepository::new(store.clone()),
        reservations: ReservationRepository::new(store.clone()),
        store,
    }
}

fn item(name: &str, quantity: u32, cents: i64, category: &str) -> NewItem {
    NewItem {
        name: name.into(),
        description: String::new(),
        sku: None,
        quantity,
        unit_price: Money::from_cents(cents),
        category: category.into(),
    }
}

mod shared_store {
    use super::*;

    #[tokio::test]
    async fn items_and_orders_coexist_without_collision() {
        let r = repos();
        let widget = r.items.create(item("Widget", 5, 999, "tools")).await.unwrap();
        let order = r
            .orders
            .create(NewOrder {
                customer_id: CustomerId::new("c1"),
                lines: vec![NewOrderLine {
                    item_id: widget.id.clone(),
                    quantity: 2,
                    unit_price: widget.unit_price,
                }],
            })
            .await
            .unwrap();

        // item, category entry, order, customer entry
        assert_eq!(r.store.record_count().await, 4);
        assert_eq!(r.items.list(None).await.unwrap().len(), 1);
        assert_eq!(r.orders.list(None, None).await.unwrap().len(), 1);
        assert_eq!(order.total_amount.cents(), 1998);

        let raw = r.store.get(&keys::order(&order.id)).await.unwrap().unwrap();
        assert_eq!(raw.attributes["items"][0]["itemId"], widget.id.as_str());
    }

    #[tokio::test]
    async fn order_total_is_not_recomputed_after_price_change() {
        let r = repos();
        let widget = r.items.create(item("Widget", 5, 1000, "")).await.unwrap();
        let order = r
            .orders
            .create(NewOrder {
                customer_id: CustomerId::new("c1"),
                lines: vec![NewOrderLine {
                    item_id: widget.id.clone(),
                    quantity: 3,
                    unit_price: widget.unit_price,
                }],
            })
            .await
            .unwrap();

        r.items
            .update(
                &widget.id,
                ItemChanges {
                    unit_price: Some(Money::from_cents(5000)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stored = r.orders.get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.total_amount.cents(), 3000);
        assert_eq!(stored.items[0].unit_price.cents(), 1000);
    }
}

mod reservation_ledger {
    use super::*;

    #[tokio::test]
    async fn reserve_then_restore_conserves_stock() {
        let r = repos();
        let widget = r.items.create(item("Widget", 5, 999, "")).await.unwrap();
        let order_id = OrderId::new("o1");

        let ReserveOutcome::Reserved(after) = r
            .reservations
            .reserve(&order_id, &widget.id, 3)
            .await
            .unwrap()
        else {
            panic!("expected reservation");
        };
        assert_eq!(after.quantity, 2);

        let RestoreOutcome::Restored {
            reservation,
            item: Some(restored),
        } = r.reservations.restore(&order_id, &widget.id).await.unwrap()
        else {
            panic!("expected restore");
        };
        assert_eq!(reservation.quantity, 3);
        assert_eq!(restored.quantity, 5);

        let ledger = r
            .reservations
            .get(&order_id, &widget.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.state, ReservationState::Released);
        assert_eq!(
            r.reservations.restore(&order_id, &widget.id).await.unwrap(),
            RestoreOutcome::NothingReserved
        );
        assert_eq!(r.items.get(&widget.id).await.unwrap().unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_no_reservation() {
        let r = repos();
        let widget = r.items.create(item("Widget", 2, 999, "")).await.unwrap();

        assert_eq!(
            r.reservations
                .reserve(&OrderId::new("o2"), &widget.id, 5)
                .await
                .unwrap(),
            ReserveOutcome::Insufficient
        );
        assert!(
            r.reservations
                .get(&OrderId::new("o2"), &widget.id)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(r.items.get(&widget.id).await.unwrap().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn ledger_rows_do_not_leak_into_item_listing() {
        let r = repos();
        let widget = r.items.create(item("Widget", 5, 999, "tools")).await.unwrap();
        r.reservations
            .reserve(&OrderId::new("o1"), &widget.id, 1)
            .await
            .unwrap();

        assert!(
            r.store
                .exists(&keys::reservation(&OrderId::new("o1"), &widget.id))
                .await
                .unwrap()
        );
        assert_eq!(r.items.list(None).await.unwrap().len(), 1);
        assert_eq!(r.items.list(Some("tools")).await.unwrap().len(), 1);
    }
}

mod order_status {
    use super::*;

    #[tokio::test]
    async fn stale_transition_does_not_regress() {
        let r = repos();
        let order = r
            .orders
            .create(NewOrder {
                customer_id: CustomerId::new("c1"),
                lines: vec![NewOrderLine {
                    item_id: ItemId::new("i1"),
                    quantity: 1,
                    unit_price: Money::from_cents(100),
                }],
            })
            .await
            .unwrap();

        r.orders
            .transition(&order.id, OrderStatus::Pending, OrderStatus::Confirmed)
            .await
            .unwrap();
        r.orders
            .transition(&order.id, OrderStatus::Confirmed, OrderStatus::Shipped)
            .await
            .unwrap();

        for _ in 0..2 {
            let err = r
                .orders
                .transition(&order.id, OrderStatus::Pending, OrderStatus::Confirmed)
                .await
                .unwrap_err();
            assert!(err.is_precondition_failed());
        }

        let stored = r.orders.get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);
        assert_eq!(stored.total_amount, order.total_amount);
    }

    #[tokio::test]
    async fn unavailable_store_is_transient() {
        let r = repos();
        r.store.set_unavailable(true);

        let err = r.orders.get(&OrderId::new("o1")).await.unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::Transient);
    }
}
