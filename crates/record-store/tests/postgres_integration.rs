//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p record-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use record_store::{
    AttributePath, Condition, Mutation, PostgresRecordStore, RecordKey, RecordStore,
    RecordStoreError, RecordStoreExt, Version, WriteOp,
};
use serde_json::json;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

const TABLE: &str = "records";

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresRecordStore::new(temp_pool.clone(), TABLE)
                .unwrap()
                .ensure_schema()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and a cleared table
async fn get_test_store() -> PostgresRecordStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE records")
        .execute(&pool)
        .await
        .unwrap();

    PostgresRecordStore::new(pool, TABLE).unwrap()
}

fn item_key(id: &str) -> RecordKey {
    RecordKey::primary(format!("ITEM#{id}"))
}

#[tokio::test]
async fn test_put_and_get() {
    let store = get_test_store().await;
    let key = item_key("1");

    let written = store
        .put(key.clone(), json!({"name": "Widget", "quantity": 5}))
        .await
        .unwrap();
    assert_eq!(written.version, Version::first());

    let read = store.get(&key).await.unwrap().unwrap();
    assert_eq!(read.attributes["name"], "Widget");
    assert_eq!(read.version, Version::first());

    let rewritten = store.put(key, json!({"quantity": 6})).await.unwrap();
    assert_eq!(rewritten.version, Version::new(2));
    assert!(rewritten.attributes.get("name").is_none());
}

#[tokio::test]
async fn test_get_missing_returns_none() {
    let store = get_test_store().await;
    assert!(store.get(&item_key("missing")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_put_if_absent() {
    let store = get_test_store().await;
    let key = item_key("1");

    store.put_if_absent(key.clone(), json!({})).await.unwrap();
    let err = store.put_if_absent(key, json!({})).await.unwrap_err();
    assert!(matches!(err, RecordStoreError::PreconditionFailed { .. }));
}

#[tokio::test]
async fn test_conditional_decrement() {
    let store = get_test_store().await;
    let key = item_key("1");
    store.put(key.clone(), json!({"quantity": 5})).await.unwrap();

    let reserve = |k: i64| {
        Mutation::new()
            .add("quantity", -k)
            .require(Condition::at_least("quantity", k))
    };

    let updated = store.conditional_update(&key, reserve(3)).await.unwrap();
    assert_eq!(updated.attributes["quantity"], 2);
    assert_eq!(updated.version, Version::new(2));

    let err = store.conditional_update(&key, reserve(3)).await.unwrap_err();
    assert!(err.is_precondition_failed());

    let current = store.get(&key).await.unwrap().unwrap();
    assert_eq!(current.attributes["quantity"], 2);
}

#[tokio::test]
async fn test_conditional_update_absent_record() {
    let store = get_test_store().await;
    let err = store
        .conditional_update(&item_key("none"), Mutation::new().set("name", "x"))
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());
}

#[tokio::test]
async fn test_equals_and_nested_set() {
    let store = get_test_store().await;
    let key = RecordKey::primary("ORDER#1");
    store
        .put(
            key.clone(),
            json!({"status": "PENDING", "reservedItems": {}}),
        )
        .await
        .unwrap();

    let updated = store
        .conditional_update(
            &key,
            Mutation::new()
                .set(
                    AttributePath::from_segments(["reservedItems", "item-1"]),
                    true,
                )
                .require(Condition::equals("status", "PENDING")),
        )
        .await
        .unwrap();
    assert_eq!(updated.attributes["reservedItems"]["item-1"], true);

    let err = store
        .conditional_update(
            &key,
            Mutation::new()
                .set("status", "CONFIRMED")
                .require(Condition::equals("status", "SHIPPED")),
        )
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());
}

#[tokio::test]
async fn test_set_with_missing_parent_is_rejected() {
    let store = get_test_store().await;
    let key = RecordKey::primary("ORDER#2");
    store.put(key.clone(), json!({"status": "PENDING"})).await.unwrap();

    let err = store
        .conditional_update(
            &key,
            Mutation::new().set(AttributePath::from_segments(["reservedItems", "x"]), true),
        )
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());
}

#[tokio::test]
async fn test_version_condition() {
    let store = get_test_store().await;
    let key = item_key("v");
    store.put(key.clone(), json!({"quantity": 1})).await.unwrap();

    store
        .conditional_update(
            &key,
            Mutation::new()
                .set("quantity", 2)
                .require(Condition::VersionIs(Version::first())),
        )
        .await
        .unwrap();

    let err = store
        .conditional_update(
            &key,
            Mutation::new()
                .set("quantity", 3)
                .require(Condition::VersionIs(Version::first())),
        )
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());
}

#[tokio::test]
async fn test_concurrent_reservations_never_oversell() {
    let store = get_test_store().await;
    let key = item_key("hot");
    store.put(key.clone(), json!({"quantity": 10})).await.unwrap();

    let attempts = (0..30).map(|_| {
        let store = store.clone();
        let key = key.clone();
        async move {
            store
                .try_update(
                    &key,
                    Mutation::new()
                        .add("quantity", -1)
                        .require(Condition::at_least("quantity", 1)),
                )
                .await
                .unwrap()
                .is_some()
        }
    });
    let results = futures_util::future::join_all(attempts).await;

    assert_eq!(results.iter().filter(|ok| **ok).count(), 10);
    let record = store.get(&key).await.unwrap().unwrap();
    assert_eq!(record.attributes["quantity"], 0);
}

#[tokio::test]
async fn test_upper_bound_condition() {
    let store = get_test_store().await;
    let key = item_key("1");
    store.put(key.clone(), json!({"quantity": 8})).await.unwrap();

    let guarded = |delta: i64| {
        Mutation::new()
            .add("quantity", delta)
            .require(Condition::at_most("quantity", 10 - delta))
    };

    let record = store.conditional_update(&key, guarded(2)).await.unwrap();
    assert_eq!(record.attributes["quantity"], 10);

    let err = store.conditional_update(&key, guarded(1)).await.unwrap_err();
    assert!(err.is_precondition_failed());
}

#[tokio::test]
async fn test_transaction_commits_together() {
    let store = get_test_store().await;
    let item = item_key("1");
    let ledger = RecordKey::new("RESERVATION#o1", "ITEM#1");
    store.put(item.clone(), json!({"quantity": 5})).await.unwrap();

    let written = store
        .transact(vec![
            WriteOp::insert(ledger.clone(), json!({"state": "RESERVED", "quantity": 2})),
            WriteOp::update(
                item.clone(),
                Mutation::new()
                    .add("quantity", -2)
                    .require(Condition::at_least("quantity", 2)),
            ),
        ])
        .await
        .unwrap();

    assert_eq!(written.len(), 2);
    assert_eq!(written[0].version, Version::first());
    assert_eq!(written[1].attributes["quantity"], 3);
    assert!(store.exists(&ledger).await.unwrap());
}

#[tokio::test]
async fn test_transaction_rolls_back_on_failed_condition() {
    let store = get_test_store().await;
    let item = item_key("1");
    let ledger = RecordKey::new("RESERVATION#o1", "ITEM#1");
    store.put(item.clone(), json!({"quantity": 1})).await.unwrap();

    let err = store
        .transact(vec![
            WriteOp::insert(ledger.clone(), json!({"state": "RESERVED", "quantity": 2})),
            WriteOp::update(
                item.clone(),
                Mutation::new()
                    .add("quantity", -2)
                    .require(Condition::at_least("quantity", 2)),
            ),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, RecordStoreError::PreconditionFailed { ref key } if *key == item));
    assert!(!store.exists(&ledger).await.unwrap());
    let record = store.get(&item).await.unwrap().unwrap();
    assert_eq!(record.attributes["quantity"], 1);
    assert_eq!(record.version, Version::first());

    // A duplicate insert is reported against the ledger key
    store.put(ledger.clone(), json!({"state": "RESERVED"})).await.unwrap();
    let err = store
        .transact(vec![
            WriteOp::insert(ledger.clone(), json!({})),
            WriteOp::update(item, Mutation::new().add("quantity", -1)),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, RecordStoreError::PreconditionFailed { ref key } if *key == ledger));
}

#[tokio::test]
async fn test_delete() {
    let store = get_test_store().await;
    let key = item_key("d");
    store.put(key.clone(), json!({})).await.unwrap();

    assert!(store.delete(&key).await.unwrap().is_some());
    assert!(store.delete(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_prefix_and_partition_queries() {
    let store = get_test_store().await;
    store.put(item_key("b"), json!({})).await.unwrap();
    store.put(item_key("a"), json!({})).await.unwrap();
    store
        .put(RecordKey::primary("ORDER#1"), json!({}))
        .await
        .unwrap();
    store
        .put(RecordKey::new("METADATA#CATEGORY#book", "ITEM#a"), json!({}))
        .await
        .unwrap();
    store
        .put(RecordKey::new("METADATA#CATEGORY#books", "ITEM#b"), json!({}))
        .await
        .unwrap();
    store.put(RecordKey::primary("ITEMS"), json!({})).await.unwrap();

    let items = store.query_by_prefix("ITEM#").await.unwrap();
    let pks: Vec<_> = items.iter().map(|r| r.key.partition_key.clone()).collect();
    assert_eq!(pks, vec!["ITEM#a", "ITEM#b"]);

    let book = store.query_partition("METADATA#CATEGORY#book").await.unwrap();
    assert_eq!(book.len(), 1);
    assert_eq!(book[0].key.sort_key, "ITEM#a");
}

#[tokio::test]
async fn test_invalid_table_name_rejected() {
    let info = get_container_info().await;
    let pool = PgPool::connect(&info.connection_string).await.unwrap();
    let result = PostgresRecordStore::new(pool, "records; DROP TABLE records");
    assert!(matches!(result, Err(RecordStoreError::InvalidTableName(_))));
}
