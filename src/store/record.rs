//! Records and their composite ordering key.
//!
//! A [`ResourceId`] names a record by (origin partition, index): the
//! partition the record was created in and its monotonic position there.
//! Split rehashing and merge re-insertion never rewrite a ResourceId, which
//! is what keeps continuation tokens valid across topology changes: the
//! composite key filter "strictly greater than the last-seen ResourceId"
//! means the same thing before and after a split or merge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable partition identifier, monotonically allocated, never reused.
pub type PartitionId = u64;

/// Composite ordering key: origin partition id, then per-partition index.
///
/// `Ord` is lexicographic over (partition, index); feed continuation is
/// "every record with ResourceId strictly greater than this".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ResourceId {
    /// Partition the record was created in. Survives rehashing.
    pub partition: PartitionId,
    /// Monotonic creation index within the origin partition.
    pub index: u64,
}

impl ResourceId {
    pub fn new(partition: PartitionId, index: u64) -> Self {
        Self { partition, index }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.partition, self.index)
    }
}

/// An immutable stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Composite ordering key, assigned at creation.
    pub resource_id: ResourceId,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Logical document id, unique within a partition key.
    pub identifier: String,
    /// User payload; the partition key is extracted from it.
    pub payload: Value,
}

impl Record {
    /// The record as it appears in a page envelope's `Documents` array:
    /// payload fields plus the system properties `_rid`, `_ts`, `id`.
    pub fn to_document(&self) -> Value {
        let mut document = match &self.payload {
            Value::Object(map) => Value::Object(map.clone()),
            other => serde_json::json!({ "payload": other }),
        };

        if let Value::Object(map) = &mut document {
            map.insert("_rid".to_string(), Value::String(self.resource_id.to_string()));
            map.insert(
                "_ts".to_string(),
                Value::Number(self.timestamp.timestamp_millis().into()),
            );
            map.insert("id".to_string(), Value::String(self.identifier.clone()));
        }

        document
    }
}

/// Ordered record storage for one partition.
///
/// Append-only; relative order is preserved when records move between
/// partitions during split rehashing, and merges re-establish ResourceId
/// order explicitly before re-insertion.
#[derive(Debug, Clone, Default)]
pub struct Records {
    entries: Vec<Record>,
}

impl Records {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.entries.push(record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Record> {
        self.entries
    }
}

impl FromIterator<Record> for Records {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
