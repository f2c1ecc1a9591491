use serde::{Deserialize, Serialize};

/// Composite address of a record.
///
/// The partition key groups related records (an entity and its children, or
/// the members of a secondary index); the sort key orders them within the
/// partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub partition_key: String,
    pub sort_key: String,
}

impl RecordKey {
    /// Creates a key from its two parts.
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }

    /// Creates a key whose sort key repeats the partition key.
    ///
    /// Used for the primary row of an entity.
    pub fn primary(partition_key: impl Into<String>) -> Self {
        let partition_key = partition_key.into();
        Self {
            sort_key: partition_key.clone(),
            partition_key,
        }
    }

    /// Returns true if the partition key starts with the given prefix.
    pub fn in_partition_prefix(&self, prefix: &str) -> bool {
        self.partition_key.starts_with(prefix)
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.partition_key, self.sort_key)
    }
}
