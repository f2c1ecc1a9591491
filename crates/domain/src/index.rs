//! Denormalized index maintenance.
//!
//! Index rows are written after the primary row. If an index write fails the
//! primary write stands: the entity is correct but temporarily missing from
//! its index partition until the index is rebuilt. Such failures are logged
//! and counted, never returned to the caller.

use record_store::{RecordKey, RecordStore};

/// Outcome of an index rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Index rows (re)written from primary records.
    pub written: usize,
    /// Stale index rows removed.
    pub removed: usize,
}

/// Writes an index row, logging and counting a failure instead of returning it.
pub(crate) async fn write_entry<S: RecordStore>(
    store: &S,
    index: &'static str,
    key: RecordKey,
    attributes: serde_json::Value,
) {
    if let Err(e) = store.put(key.clone(), attributes).await {
        tracing::error!(
            index,
            key = %key,
            error = %e,
            "index write failed; primary record is unindexed until rebuild"
        );
        metrics::counter!("record_store_index_write_failures_total", "index" => index)
            .increment(1);
    }
}

/// Removes an index row, logging and counting a failure instead of returning it.
pub(crate) async fn remove_entry<S: RecordStore>(store: &S, index: &'static str, key: RecordKey) {
    if let Err(e) = store.delete(&key).await {
        tracing::error!(
            index,
            key = %key,
            error = %e,
            "stale index entry could not be removed"
        );
        metrics::counter!("record_store_index_write_failures_total", "index" => index)
            .increment(1);
    }
}
