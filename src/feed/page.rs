//! Feed pages and the consumer-facing envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::CONTAINER_RID;
use crate::store::Record;

use super::state::FeedRangeState;

/// One page of records from a single range, plus the state to resume
/// after it.
#[derive(Debug, Clone)]
pub struct FeedPage {
    /// Records in composite-key order. May be empty.
    pub records: Vec<Record>,
    /// Resume position after this page; `None` when this leg of the feed
    /// is exhausted.
    pub state: Option<FeedRangeState>,
}

impl FeedPage {
    /// Logical document ids in this page, in order.
    pub fn identifiers(&self) -> Vec<String> {
        self.records.iter().map(|r| r.identifier.clone()).collect()
    }

    /// The wire envelope consumers receive.
    pub fn envelope(&self) -> PageEnvelope {
        let documents: Vec<Value> = self.records.iter().map(Record::to_document).collect();
        PageEnvelope {
            count: documents.len(),
            documents,
            rid: CONTAINER_RID.to_string(),
        }
    }
}

/// The page content envelope: `{ "Documents": [...], "_count": n,
/// "_rid": "…" }`. Deserialization ignores unknown fields, so consumers
/// extract `Documents` and stay compatible with richer producers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEnvelope {
    #[serde(rename = "Documents")]
    pub documents: Vec<Value>,
    #[serde(rename = "_count")]
    pub count: usize,
    #[serde(rename = "_rid")]
    pub rid: String,
}
