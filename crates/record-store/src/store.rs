use async_trait::async_trait;
use serde::Serialize;

use crate::{Mutation, Record, RecordKey, RecordStoreError, Result, WriteOp};

/// Core trait for record store implementations.
///
/// Single-record operations are atomic. Conditional operations evaluate their
/// preconditions and apply their updates as one step, so two concurrent
/// writers racing on the same record cannot both observe the old value.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Reads a single record.
    ///
    /// Returns None if no record exists under the key.
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>>;

    /// Writes a record unconditionally, replacing any existing attributes.
    async fn put(&self, key: RecordKey, attributes: serde_json::Value) -> Result<Record>;

    /// Inserts a record only if the key is unused.
    ///
    /// Fails with `PreconditionFailed` if a record already exists.
    async fn put_if_absent(&self, key: RecordKey, attributes: serde_json::Value) -> Result<Record>;

    /// Applies a mutation if the record exists and every condition holds.
    ///
    /// Fails with `PreconditionFailed` otherwise; the stored record is left
    /// untouched in that case. Returns the record as written.
    async fn conditional_update(&self, key: &RecordKey, mutation: Mutation) -> Result<Record>;

    /// Commits a batch of writes atomically.
    ///
    /// Either every write applies or none does. The first write whose
    /// precondition fails aborts the batch with `PreconditionFailed` naming
    /// that write's key. Returns the written records in batch order.
    async fn transact(&self, ops: Vec<WriteOp>) -> Result<Vec<Record>>;

    /// Deletes a record, returning it if it existed.
    async fn delete(&self, key: &RecordKey) -> Result<Option<Record>>;

    /// Returns every record whose partition key starts with `prefix`.
    ///
    /// Records are ordered by partition key, then sort key.
    async fn query_by_prefix(&self, prefix: &str) -> Result<Vec<Record>>;

    /// Returns every record in a single partition, ordered by sort key.
    async fn query_partition(&self, partition_key: &str) -> Result<Vec<Record>>;
}

/// Extension trait providing typed convenience methods for record stores.
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    /// Serializes an entity and inserts it only if the key is unused.
    async fn insert_entity<T>(&self, key: RecordKey, entity: &T) -> Result<Record>
    where
        T: Serialize + Sync,
    {
        let attributes = serde_json::to_value(entity)?;
        self.put_if_absent(key, attributes).await
    }

    /// Checks if a record exists.
    async fn exists(&self, key: &RecordKey) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Applies a mutation, mapping `PreconditionFailed` to `None`.
    async fn try_update(&self, key: &RecordKey, mutation: Mutation) -> Result<Option<Record>> {
        match self.conditional_update(key, mutation).await {
            Ok(record) => Ok(Some(record)),
            Err(RecordStoreError::PreconditionFailed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// Blanket implementation for all RecordStore implementations
impl<T: RecordStore + ?Sized> RecordStoreExt for T {}
