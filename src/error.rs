//! Crate-level error taxonomy.
//!
//! # Error Classes
//!
//! Errors fall into four classes with distinct propagation rules:
//!
//! ## Retryable-transient
//!
//! Throttling ([`Error::Throttled`]). Propagated to the immediate caller
//! with a backoff hint, never retried silently inside an enumerator. The
//! caller decides whether and when to retry; see [`crate::retry`] for the
//! standard policies.
//!
//! ## Routing-stale
//!
//! A partition was split or merged away ([`Error::Gone`]). The
//! cross-partition enumerator is the only layer permitted to convert this
//! class into retried work (re-resolving the range into children and
//! continuing the drain). Lower layers pass it through verbatim.
//!
//! ## Malformed-input
//!
//! Unparseable continuations, ranges that never existed, missing items.
//! Fatal to the operation, surfaced immediately, never retried.
//!
//! ## Cancellation
//!
//! [`Error::Cancelled`] is distinct from failure: it means the operation
//! was aborted, not that it failed. Callers must branch on
//! [`Error::is_cancelled`] before treating a result as an error.

use std::time::Duration;

use thiserror::Error;

use crate::store::HashRange;

/// Result type for all crossfeed operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the store and the enumerator stack.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The store is shedding load. Carries the 429-equivalent status and a
    /// suggested backoff; the receiver must propagate it unless explicitly
    /// opting into a retry policy.
    #[error("throttled (status {status}), retry after {retry_after:?}")]
    Throttled {
        status: u16,
        retry_after: Duration,
    },

    /// The range's routing moved (split or merged away). The caller must
    /// re-resolve via the feed range provider.
    #[error("range {range} is gone: routing has moved")]
    Gone { range: HashRange },

    /// The range was never part of this store's routing, current or past.
    #[error("range {range} does not exist")]
    UnknownRange { range: HashRange },

    /// No record with this identifier under the given partition key.
    #[error("document with id {identifier:?} not found")]
    NotFound { identifier: String },

    /// A continuation token that no enumerator of this type produced.
    #[error("malformed continuation token: {0}")]
    MalformedContinuation(String),

    /// Continuation or envelope (de)serialization failed.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Merge requires the two source ranges to share a boundary.
    #[error("ranges {left} and {right} are not adjacent")]
    NonAdjacentRanges { left: HashRange, right: HashRange },

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operation observed a cancellation signal before doing new work.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Build the standard throttle failure with the default backoff hint.
    pub fn throttled() -> Self {
        Error::Throttled {
            status: crate::constants::THROTTLE_STATUS,
            retry_after: Duration::from_millis(crate::constants::DEFAULT_RETRY_AFTER_MS),
        }
    }

    /// Whether the caller may retry this operation after backing off.
    ///
    /// Only transient throttling qualifies; routing-stale failures need
    /// re-resolution (not a blind retry) and malformed input never succeeds.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Throttled { .. })
    }

    /// The suggested backoff, when this is a throttle failure.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Throttled { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether this failure means the range's routing moved and the caller
    /// should re-resolve child ranges.
    pub fn is_routing_stale(&self) -> bool {
        matches!(self, Error::Gone { .. })
    }

    /// Whether the operation was aborted rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttled_is_retryable_with_hint() {
        let err = Error::throttled();
        assert!(err.is_retryable());
        assert_eq!(
            err.retry_after(),
            Some(Duration::from_millis(crate::constants::DEFAULT_RETRY_AFTER_MS))
        );
        assert!(!err.is_routing_stale());
    }

    #[test]
    fn gone_is_routing_stale_not_retryable() {
        let err = Error::Gone {
            range: HashRange::full(),
        };
        assert!(err.is_routing_stale());
        assert!(!err.is_retryable());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn cancelled_is_distinct_from_failure() {
        let err = Error::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_retryable());
        assert!(!err.is_routing_stale());
    }
}
