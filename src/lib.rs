//! # Crossfeed
//! Resumable cross-partition pagination over a hash-partitioned document store.
//!
//! This crate provides the full drain protocol for a horizontally
//! partitioned store: per-range page enumeration, serialized continuation
//! tokens, and transparent recovery when partitions split or merge in the
//! middle of a drain. This is pure Rust all the way down; meaning memory
//! safety, safe concurrency, low resource usage, and speed.
//!
//! # Goals
//! - Easy to understand code
//! - Leverage best in class libraries such as [Tokio](https://tokio.rs/), [Serde](https://serde.rs/)
//! - Exactly-once delivery of every record across splits, merges, throttles, and restarts
//! - Be a building block for partitioned data services
//!
//! ## Getting started
//! Install `crossfeed` to your rust project with `cargo add crossfeed` or include the following snippet in your `Cargo.toml` dependencies:
//! ```toml
//! crossfeed = "0.1"
//! ```
//!
//! ### Draining a partitioned store
//! [`PartitionedStore`](store::PartitionedStore) is the in-memory store;
//! [`read_feed`](feed::read_feed) drains it page by page. Every yielded
//! page carries a [`CrossFeedRangeState`](feed::CrossFeedRangeState) that
//! serializes to a continuation token, so a drain can stop after any page
//! and resume in a new process with [`resume_feed`](feed::resume_feed).
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use crossfeed::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(PartitionedStore::new("/pk"));
//!     for i in 0..100 {
//!         store.create_item(json!({ "pk": i, "value": i * 2 })).await?;
//!     }
//!
//!     let cancel = CancellationToken::new();
//!     let mut feed = read_feed(store.clone(), PaginationConfig::default())?;
//!     while let Some(page) = feed.next_page(&cancel).await? {
//!         println!("{} records", page.page.records.len());
//!         if let Some(token) = page.continuation_token()? {
//!             // Persist `token`; `resume_feed(store, config, &token)`
//!             // picks up exactly here.
//!             let _ = token;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Splits and merges performed between pages (or between a stop and a
//! resume) are handled inside [`next_page`](feed::CrossPartitionEnumerator::next_page):
//! the drain still yields every surviving record exactly once.

#![forbid(unsafe_code)]

pub mod cancel;
pub mod config;
pub mod constants;
pub mod error;
pub mod feed;
pub mod retry;
pub mod store;
pub mod telemetry;

pub mod prelude {
    //! Main export of drain structures
    //!
    //! Everything a typical drain needs: the store, the feed entry
    //! points, configuration, cancellation, and the error type.

    pub use crate::cancel::CancellationToken;
    pub use crate::config::PaginationConfig;
    pub use crate::error::{Error, Result};
    pub use crate::feed::{
        CrossFeedRangeState, CrossPartitionEnumerator, CrossPartitionPage, FeedPage,
        FeedRangeState, PrefetchPolicy, read_feed, resume_feed,
    };
    pub use crate::store::{
        Continuation, FailureConfig, HashRange, PartitionedStore, Record, ResourceId,
    };
}
