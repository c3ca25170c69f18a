//! Resumable pagination over a partitioned store.
//!
//! The layer is built bottom-up:
//!
//! | Module | Role |
//! |--------|------|
//! | [`state`] | Per-range and cross-range drain state, token codec |
//! | [`page`] | Page of records plus its wire envelope |
//! | [`provider`] | Routing snapshot and stale-range resolution |
//! | [`enumerator`] | Single-range page source |
//! | [`buffered`] | Read-ahead queue around one page source |
//! | [`prefetch`] | Bounded parallel background fetches |
//! | [`cross`] | The cross-partition engine itself |
//!
//! Most callers only need [`read_feed`] / [`resume_feed`] and the types
//! they return.

pub mod buffered;
pub mod cross;
pub mod enumerator;
pub mod page;
pub mod prefetch;
pub mod provider;
pub mod state;

pub use buffered::BufferedEnumerator;
pub use cross::{
    CrossPartitionEnumerator, CrossPartitionPage, PrefetchPolicy, StateComparer, read_feed,
    resume_feed,
};
pub use enumerator::{PageSource, PartitionRangeEnumerator};
pub use page::{FeedPage, PageEnvelope};
pub use prefetch::{Prefetcher, prefetch_in_parallel};
pub use provider::{FeedRangeProvider, StoreFeedRangeProvider};
pub use state::{CrossFeedRangeState, FeedRangeState};
