use serde_json::Value;

use crate::{Record, RecordKey, Version};

/// Path to an attribute inside a record's JSON attributes.
///
/// Each segment names an object member; `reservedItems.item-1` is expressed as
/// two segments so that ids containing dots stay unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath(Vec<String>);

impl AttributePath {
    /// Creates a path from explicit segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Looks up the value at this path.
    pub fn resolve<'a>(&self, attributes: &'a Value) -> Option<&'a Value> {
        self.0
            .iter()
            .try_fold(attributes, |value, segment| value.get(segment.as_str()))
    }

    fn parent_mut<'a>(&self, attributes: &'a mut Value) -> Option<&'a mut serde_json::Map<String, Value>> {
        let (_, parents) = self.0.split_last()?;
        let mut current = attributes;
        for segment in parents {
            current = current.get_mut(segment.as_str())?;
        }
        current.as_object_mut()
    }
}

impl From<&str> for AttributePath {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl std::fmt::Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// A precondition evaluated atomically with a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The attribute exists and equals the given value.
    Equals(AttributePath, Value),
    /// The attribute is an integer greater than or equal to the bound.
    AtLeast(AttributePath, i64),
    /// The attribute is an integer less than or equal to the bound.
    AtMost(AttributePath, i64),
    /// The record is at exactly this version.
    VersionIs(Version),
}

impl Condition {
    /// Shorthand for [`Condition::Equals`] on a top-level attribute.
    pub fn equals(path: impl Into<AttributePath>, value: impl Into<Value>) -> Self {
        Condition::Equals(path.into(), value.into())
    }

    /// Shorthand for [`Condition::AtLeast`] on a top-level attribute.
    pub fn at_least(path: impl Into<AttributePath>, bound: i64) -> Self {
        Condition::AtLeast(path.into(), bound)
    }

    /// Shorthand for [`Condition::AtMost`] on a top-level attribute.
    pub fn at_most(path: impl Into<AttributePath>, bound: i64) -> Self {
        Condition::AtMost(path.into(), bound)
    }

    /// Evaluates the condition against a stored record.
    pub fn holds(&self, record: &Record) -> bool {
        match self {
            Condition::Equals(path, expected) => path.resolve(&record.attributes) == Some(expected),
            Condition::AtLeast(path, bound) => path
                .resolve(&record.attributes)
                .and_then(Value::as_i64)
                .is_some_and(|current| current >= *bound),
            Condition::AtMost(path, bound) => path
                .resolve(&record.attributes)
                .and_then(Value::as_i64)
                .is_some_and(|current| current <= *bound),
            Condition::VersionIs(version) => record.version == *version,
        }
    }
}

/// A single attribute change applied by a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Replace (or create) the attribute. Its parent object must exist.
    Set(AttributePath, Value),
    /// Add a signed delta to an integer attribute. A missing attribute counts as 0.
    Add(AttributePath, i64),
}

impl Update {
    /// Returns the path this update touches.
    pub fn path(&self) -> &AttributePath {
        match self {
            Update::Set(path, _) | Update::Add(path, _) => path,
        }
    }

    /// Applies the update in place.
    ///
    /// Returns a human-readable reason when the attributes cannot take it.
    pub fn apply(&self, attributes: &mut Value) -> std::result::Result<(), String> {
        let path = self.path();
        let Some(name) = path.segments().last() else {
            return Err("empty attribute path".to_string());
        };
        let parent = path
            .parent_mut(attributes)
            .ok_or_else(|| "parent is missing or not an object".to_string())?;

        match self {
            Update::Set(_, value) => {
                parent.insert(name.clone(), value.clone());
            }
            Update::Add(_, delta) => {
                let current = match parent.get(name.as_str()) {
                    None | Some(Value::Null) => 0,
                    Some(value) => value
                        .as_i64()
                        .ok_or_else(|| "attribute is not an integer".to_string())?,
                };
                let next = current
                    .checked_add(*delta)
                    .ok_or_else(|| "integer overflow".to_string())?;
                parent.insert(name.clone(), Value::from(next));
            }
        }
        Ok(())
    }
}

/// A conditional write: attribute updates guarded by preconditions.
///
/// The record must exist for any mutation to apply; an empty condition list
/// therefore means "update if present".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mutation {
    pub updates: Vec<Update>,
    pub conditions: Vec<Condition>,
}

impl Mutation {
    /// Creates an empty mutation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute.
    pub fn set(mut self, path: impl Into<AttributePath>, value: impl Into<Value>) -> Self {
        self.updates.push(Update::Set(path.into(), value.into()));
        self
    }

    /// Adds a signed delta to an integer attribute.
    pub fn add(mut self, path: impl Into<AttributePath>, delta: i64) -> Self {
        self.updates.push(Update::Add(path.into(), delta));
        self
    }

    /// Adds a precondition.
    pub fn require(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Returns true if every precondition holds for the record.
    pub fn preconditions_hold(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.holds(record))
    }
}

/// One write inside a multi-record transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert a new record; fails if the key is in use.
    Insert {
        key: RecordKey,
        attributes: Value,
    },
    /// Apply a conditional mutation to an existing record.
    Update { key: RecordKey, mutation: Mutation },
}

impl WriteOp {
    pub fn insert(key: RecordKey, attributes: Value) -> Self {
        WriteOp::Insert { key, attributes }
    }

    pub fn update(key: RecordKey, mutation: Mutation) -> Self {
        WriteOp::Update { key, mutation }
    }

    /// Returns the key this write targets.
    pub fn key(&self) -> &RecordKey {
        match self {
            WriteOp::Insert { key, .. } | WriteOp::Update { key, .. } => key,
        }
    }
}
