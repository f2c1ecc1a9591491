use criterion::{Criterion, criterion_group, criterion_main};
use record_store::{
    Condition, InMemoryRecordStore, Mutation, RecordKey, RecordStoreExt, store::RecordStore,
};
use serde_json::json;

fn bench_put(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryRecordStore::new();
    let mut n = 0u64;

    c.bench_function("record_store/put", |b| {
        b.iter(|| {
            n += 1;
            rt.block_on(async {
                store
                    .put(
                        RecordKey::primary(format!("ITEM#{n}")),
                        json!({"name": "Widget", "quantity": 10}),
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reserve_decrement(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryRecordStore::new();
    let key = RecordKey::primary("ITEM#bench");
    rt.block_on(async {
        store
            .put(key.clone(), json!({"quantity": i64::MAX / 2}))
            .await
            .unwrap();
    });

    c.bench_function("record_store/conditional_decrement", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .conditional_update(
                        &key,
                        Mutation::new()
                            .add("quantity", -1)
                            .require(Condition::at_least("quantity", 1)),
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_rejected_update(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryRecordStore::new();
    let key = RecordKey::primary("ITEM#empty");
    rt.block_on(async {
        store.put(key.clone(), json!({"quantity": 0})).await.unwrap();
    });

    c.bench_function("record_store/conditional_rejected", |b| {
        b.iter(|| {
            rt.block_on(async {
                let outcome = store
                    .try_update(
                        &key,
                        Mutation::new()
                            .add("quantity", -1)
                            .require(Condition::at_least("quantity", 1)),
                    )
                    .await
                    .unwrap();
                assert!(outcome.is_none());
            });
        });
    });
}

fn bench_partition_query(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryRecordStore::new();
    rt.block_on(async {
        for i in 0..500 {
            let category = if i % 5 == 0 { "tools" } else { "books" };
            store
                .put(
                    RecordKey::new(format!("METADATA#CATEGORY#{category}"), format!("ITEM#{i}")),
                    json!({"itemId": i.to_string()}),
                )
                .await
                .unwrap();
        }
    });

    c.bench_function("record_store/query_partition_100_of_500", |b| {
        b.iter(|| {
            rt.block_on(async {
                let records = store
                    .query_partition("METADATA#CATEGORY#tools")
                    .await
                    .unwrap();
                assert_eq!(records.len(), 100);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_put,
    bench_reserve_decrement,
    bench_rejected_update,
    bench_partition_query,
);
criterion_main!(benches);
