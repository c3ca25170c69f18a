//! Resumable drain state and the continuation token codec.
//!
//! A [`FeedRangeState`] pairs one logical range with its read position; a
//! [`CrossFeedRangeState`] is the ordered collection of those, one per
//! range the drain currently knows about, and is the unit of resumability
//! handed to callers. States are replaced, never mutated, each time a page
//! advances.
//!
//! # Wire format
//!
//! The external continuation token is a JSON list of
//! `{ "min": …, "max": …, "state": … }` triples. The `state` value is
//! opaque to everything except the enumerator type that produced it, and
//! round-trips byte-for-byte.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{Continuation, HashRange};

/// One range's read position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRangeState {
    /// The logical range this state belongs to.
    #[serde(flatten)]
    pub range: HashRange,
    /// Opaque resume position inside the range.
    #[serde(rename = "state")]
    pub continuation: Continuation,
}

impl FeedRangeState {
    /// A fresh state at the beginning of `range`.
    pub fn beginning(range: HashRange) -> Self {
        Self {
            range,
            continuation: Continuation::Beginning,
        }
    }
}

/// Ordered per-range states for a whole cross-partition drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrossFeedRangeState {
    pub states: Vec<FeedRangeState>,
}

impl CrossFeedRangeState {
    pub fn new(states: Vec<FeedRangeState>) -> Self {
        Self { states }
    }

    /// Whether any range still has (potentially) unread records.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Serialize to the external continuation token.
    pub fn to_continuation_token(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.states)?)
    }

    /// Parse an external continuation token.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedContinuation`] when the token was not produced by
    /// this enumerator family.
    pub fn from_continuation_token(token: &str) -> Result<Self> {
        let states: Vec<FeedRangeState> = serde_json::from_str(token)
            .map_err(|e| Error::MalformedContinuation(e.to_string()))?;
        Ok(Self { states })
    }
}
