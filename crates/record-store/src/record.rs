use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{RecordKey, Result};

/// Version number of a record, used for optimistic concurrency control.
///
/// A record is at version 1 once inserted and increments by 1 on every
/// successful write.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a freshly inserted record.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A stored record: its key, version and JSON attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: RecordKey,
    pub version: Version,
    pub attributes: serde_json::Value,
}

impl Record {
    /// Deserializes the attributes into a typed entity.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.attributes.clone())?)
    }

    /// Consumes the record and deserializes its attributes.
    pub fn into_entity<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.attributes)?)
    }
}
