use common::{CustomerId, ItemId, OrderId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    ItemRepository, Money, NewItem, NewOrder, NewOrderLine, OrderRepository,
    ReservationRepository,
};
use record_store::InMemoryRecordStore;

fn new_item(category: &str, quantity: u32) -> NewItem {
    NewItem {
        name: "Widget".into(),
        quantity,
        unit_price: Money::from_cents(999),
        category: category.into(),
        ..Default::default()
    }
}

fn bench_create_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orders = OrderRepository::new(InMemoryRecordStore::new());

    c.bench_function("domain/create_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                orders
                    .create(NewOrder {
                        customer_id: CustomerId::new("bench"),
                        lines: vec![NewOrderLine {
                            item_id: ItemId::new("i1"),
                            quantity: 2,
                            unit_price: Money::from_cents(1000),
                        }],
                    })
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reserve_and_restore(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryRecordStore::new();
    let items = ItemRepository::new(store.clone());
    let reservations = ReservationRepository::new(store);
    let item = rt.block_on(items.create(new_item("", 1_000))).unwrap();

    c.bench_function("domain/reserve_and_restore", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order = OrderId::generate();
                reservations.reserve(&order, &item.id, 1).await.unwrap();
                reservations.restore(&order, &item.id).await.unwrap();
            });
        });
    });
}

fn bench_list_category(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let items = ItemRepository::new(InMemoryRecordStore::new());
    rt.block_on(async {
        for i in 0..200 {
            let category = if i % 2 == 0 { "tools" } else { "garden" };
            items.create(new_item(category, i)).await.unwrap();
        }
    });

    c.bench_function("domain/list_category_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                items.list(Some("tools")).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create_order,
    bench_reserve_and_restore,
    bench_list_category
);
criterion_main!(benches);
