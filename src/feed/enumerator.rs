//! Single-partition page sources.
//!
//! [`PageSource`] is the seam every concrete page kind implements: a
//! pull-based sequence of pages for one range, advancing a per-range
//! continuation. Page kinds (read feed, query, change feed) differ only in
//! page content and continuation encoding; the cross-partition layer is
//! generic over the trait.
//!
//! Failure contract: an enumerator never sleeps and never retries. A
//! throttle failure is returned verbatim with its backoff hint so the
//! caller can pace retries. A routing failure (`Gone`) tells the
//! cross-partition layer to re-resolve child ranges. Failures leave the
//! enumerator's state at its pre-failure position, so the same call can be
//! reissued.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::store::{HashRange, PartitionedStore};

use super::page::FeedPage;
use super::state::FeedRangeState;

/// A pull-based sequence of pages for one range.
///
/// Single-caller: `advance` takes `&mut self` and must not be invoked
/// concurrently on one instance. Independent instances may be driven
/// concurrently.
#[async_trait]
pub trait PageSource: Send {
    /// Fetch the next page and move the continuation forward.
    async fn advance(&mut self, cancel: &CancellationToken) -> Result<FeedPage>;

    /// Current range + continuation.
    fn state(&self) -> FeedRangeState;

    /// Whether another `advance` can produce records.
    fn has_more(&self) -> bool;

    /// Route subsequent reads through `routing`, keeping this source's
    /// own range and continuation.
    ///
    /// Used by the cross-partition layer when a merge absorbed this
    /// source's range into a larger one: the source keeps draining its
    /// sub-range through the merged partition.
    fn reroute(&mut self, routing: HashRange);
}

/// Read-feed page source for one partition range.
pub struct PartitionRangeEnumerator {
    store: Arc<PartitionedStore>,
    state: FeedRangeState,
    /// Range reads are addressed to. Equal to `state.range` until a merge
    /// reroutes this enumerator through a larger range.
    routing: HashRange,
    page_size: usize,
    exhausted: bool,
}

impl PartitionRangeEnumerator {
    pub fn new(store: Arc<PartitionedStore>, state: FeedRangeState, page_size: usize) -> Self {
        Self {
            store,
            routing: state.range,
            state,
            page_size,
            exhausted: false,
        }
    }
}

#[async_trait]
impl PageSource for PartitionRangeEnumerator {
    async fn advance(&mut self, cancel: &CancellationToken) -> Result<FeedPage> {
        cancel.check()?;

        if self.exhausted {
            return Ok(FeedPage {
                records: Vec::new(),
                state: None,
            });
        }

        let page = self
            .store
            .read_feed_page_within(
                &self.routing,
                &self.state.range,
                self.state.continuation,
                self.page_size,
            )
            .await?;

        let state = match page.next {
            Some(continuation) => {
                self.state = FeedRangeState {
                    range: self.state.range,
                    continuation,
                };
                Some(self.state)
            }
            None => {
                self.exhausted = true;
                None
            }
        };

        Ok(FeedPage {
            records: page.records,
            state,
        })
    }

    fn state(&self) -> FeedRangeState {
        self.state
    }

    fn has_more(&self) -> bool {
        !self.exhausted
    }

    fn reroute(&mut self, routing: HashRange) {
        self.routing = routing;
    }
}
