//! Feed range resolution.
//!
//! The provider decouples "what ranges exist now" from "what range a stale
//! enumerator was reading": after a split or merge fails a read, the
//! cross-partition enumerator asks the provider how the stale range maps
//! onto current routing and recovers without restarting the whole drain.
//!
//! The trait is `#[async_trait]` so tests can substitute their own
//! topology source; [`StoreFeedRangeProvider`] is the store-backed
//! implementation, holding the store by `Arc` so multiple stores (and
//! providers) coexist in one process.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::store::{HashRange, PartitionedStore, RangeResolution};

/// Source of current feed ranges and stale-range resolution.
#[async_trait]
pub trait FeedRangeProvider: Send + Sync {
    /// Current leaf ranges, in increasing order.
    async fn get_feed_ranges(&self, cancel: &CancellationToken) -> Result<Vec<HashRange>>;

    /// Resolve a possibly-stale range to its current children, walking the
    /// split/merge lineage until leaves are reached.
    async fn get_child_ranges(
        &self,
        range: &HashRange,
        cancel: &CancellationToken,
    ) -> Result<RangeResolution>;

    /// Invalidate any cached routing snapshot so subsequent resolutions
    /// observe splits and merges that happened since the last refresh.
    async fn refresh(&self, cancel: &CancellationToken) -> Result<()>;
}

/// Provider backed by a [`PartitionedStore`].
#[derive(Debug, Clone)]
pub struct StoreFeedRangeProvider {
    store: Arc<PartitionedStore>,
}

impl StoreFeedRangeProvider {
    pub fn new(store: Arc<PartitionedStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FeedRangeProvider for StoreFeedRangeProvider {
    async fn get_feed_ranges(&self, cancel: &CancellationToken) -> Result<Vec<HashRange>> {
        cancel.check()?;
        // Listing is always against current routing; the lagging snapshot
        // exists for readers mid-drain, not for initial enumeration.
        self.store.refresh().await;
        Ok(self.store.snapshot_ranges().await)
    }

    async fn get_child_ranges(
        &self,
        range: &HashRange,
        cancel: &CancellationToken,
    ) -> Result<RangeResolution> {
        cancel.check()?;
        let resolution = self.store.resolve_child_ranges(range).await;
        debug!(stale = %range, ?resolution, "resolved child ranges");
        Ok(resolution)
    }

    async fn refresh(&self, cancel: &CancellationToken) -> Result<()> {
        cancel.check()?;
        self.store.refresh().await;
        Ok(())
    }
}
