use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    Mutation, Record, RecordKey, RecordStoreError, Result, Version, WriteOp, store::RecordStore,
};

/// In-memory record store implementation for testing.
///
/// Provides the same atomicity guarantees as the PostgreSQL implementation:
/// every conditional write and every transaction holds the write lock across
/// check and apply.
/// Fault injection hooks let tests simulate an unreachable store, either
/// entirely or for writes into a family of partitions.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<BTreeMap<RecordKey, Record>>>,
    unavailable: Arc<AtomicBool>,
    failing_write_prefix: Arc<RwLock<Option<String>>>,
}

impl InMemoryRecordStore {
    /// Creates a new empty in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Makes every subsequent call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes writes into partitions starting with `prefix` fail with `Unavailable`.
    ///
    /// Reads are unaffected. Pass None to clear.
    pub async fn fail_writes_with_prefix(&self, prefix: Option<String>) {
        *self.failing_write_prefix.write().await = prefix;
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RecordStoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn check_writable(&self, key: &RecordKey) -> Result<()> {
        self.check_available()?;
        if let Some(prefix) = self.failing_write_prefix.read().await.as_deref()
            && key.in_partition_prefix(prefix)
        {
            return Err(RecordStoreError::Unavailable(format!(
                "writes to {prefix}* are failing"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
        self.check_available()?;
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, key: RecordKey, attributes: serde_json::Value) -> Result<Record> {
        self.check_writable(&key).await?;
        let mut records = self.records.write().await;
        let version = records
            .get(&key)
            .map(|existing| existing.version.next())
            .unwrap_or_else(Version::first);
        let record = Record {
            key: key.clone(),
            version,
            attributes,
        };
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn put_if_absent(&self, key: RecordKey, attributes: serde_json::Value) -> Result<Record> {
        self.check_writable(&key).await?;
        let mut records = self.records.write().await;
        if records.contains_key(&key) {
            return Err(RecordStoreError::PreconditionFailed { key });
        }
        let record = Record {
            key: key.clone(),
            version: Version::first(),
            attributes,
        };
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn conditional_update(&self, key: &RecordKey, mutation: Mutation) -> Result<Record> {
        self.check_writable(key).await?;
        let mut records = self.records.write().await;
        let record = mutated(key, records.get(key), &mutation)?;
        records.insert(key.clone(), record.clone());
        Ok(record)
    }

    async fn transact(&self, ops: Vec<WriteOp>) -> Result<Vec<Record>> {
        for op in &ops {
            self.check_writable(op.key()).await?;
        }
        let mut records = self.records.write().await;

        // Stage every write against the pending view, then commit together
        let mut staged: BTreeMap<RecordKey, Record> = BTreeMap::new();
        let mut written = Vec::with_capacity(ops.len());
        for op in &ops {
            let key = op.key();
            let current = staged.get(key).or_else(|| records.get(key));
            let record = match op {
                WriteOp::Insert { attributes, .. } => {
                    if current.is_some() {
                        return Err(RecordStoreError::PreconditionFailed { key: key.clone() });
                    }
                    Record {
                        key: key.clone(),
                        version: Version::first(),
                        attributes: attributes.clone(),
                    }
                }
                WriteOp::Update { mutation, .. } => mutated(key, current, mutation)?,
            };
            staged.insert(key.clone(), record.clone());
            written.push(record);
        }

        records.extend(staged);
        Ok(written)
    }

    async fn delete(&self, key: &RecordKey) -> Result<Option<Record>> {
        self.check_writable(key).await?;
        Ok(self.records.write().await.remove(key))
    }

    async fn query_by_prefix(&self, prefix: &str) -> Result<Vec<Record>> {
        self.check_available()?;
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.key.in_partition_prefix(prefix))
            .cloned()
            .collect())
    }

    async fn query_partition(&self, partition_key: &str) -> Result<Vec<Record>> {
        self.check_available()?;
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.key.partition_key == partition_key)
            .cloned()
            .collect())
    }
}

/// Applies a mutation to a copy of the current record.
///
/// A failing update leaves the stored record intact.
fn mutated(key: &RecordKey, current: Option<&Record>, mutation: &Mutation) -> Result<Record> {
    let Some(current) = current else {
        return Err(RecordStoreError::PreconditionFailed { key: key.clone() });
    };
    if !mutation.preconditions_hold(current) {
        return Err(RecordStoreError::PreconditionFailed { key: key.clone() });
    }

    let mut attributes = current.attributes.clone();
    for update in &mutation.updates {
        update
            .apply(&mut attributes)
            .map_err(|reason| RecordStoreError::InvalidUpdate {
                key: key.clone(),
                path: update.path().to_string(),
                reason,
            })?;
    }

    Ok(Record {
        key: key.clone(),
        version: current.version.next(),
        attributes,
    })
}
