//! Cross-partition drain engine.
//!
//! [`CrossPartitionEnumerator`] merges the page streams of every feed
//! range into one sequence of [`CrossPartitionPage`]s, ordered by range.
//! It owns the part of the protocol that single-range enumerators cannot
//! see:
//!
//! - **Routing recovery.** A `Gone` failure from one range triggers a
//!   routing refresh and a lineage resolution. A split replaces the
//!   failing enumerator with one enumerator per overlapping child range,
//!   each owning its slice of the old range and inheriting the parent's
//!   continuation; a slice that is narrower than the child routes its
//!   reads through the child. A merge reroutes the failing
//!   enumerator through the merged range: it keeps its own range and
//!   continuation and keeps draining its sub-range of the merged
//!   partition, so partially-drained siblings never re-deliver records.
//! - **State capture.** Every yielded page carries a
//!   [`CrossFeedRangeState`] describing all unfinished ranges, so a drain
//!   can stop after any page and resume in a fresh enumerator.
//! - **Prefetch.** Per [`PrefetchPolicy`], idle enumerators are advanced
//!   in the background while the current page is being fetched. Prefetch
//!   never changes which records a page contains or the order pages are
//!   yielded in, only when the underlying reads happen.
//!
//! Errors other than `Gone` pass through verbatim with all enumerator
//! state intact, so a caller can apply its own retry policy (see
//! [`crate::retry`]) around `next_page` and simply call again.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::config::PaginationConfig;
use crate::error::{Error, Result};
use crate::store::{HashRange, PartitionedStore, RangeResolution};

use super::buffered::BufferedEnumerator;
use super::enumerator::{PageSource, PartitionRangeEnumerator};
use super::page::FeedPage;
use super::prefetch::{Prefetcher, prefetch_in_parallel};
use super::provider::{FeedRangeProvider, StoreFeedRangeProvider};
use super::state::{CrossFeedRangeState, FeedRangeState};

/// Background read-ahead behavior for idle ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrefetchPolicy {
    /// No background work; every page is fetched on demand.
    #[default]
    None,
    /// While the current page is fetched, also fetch one page from the
    /// range that will be drained next.
    SinglePageAhead,
    /// While the current page is fetched, fetch one page from every idle
    /// range, bounded by `max_concurrent_prefetch`.
    All,
}

/// Ordering over per-range states; decides which started range yields its
/// next page first. The default drains in increasing key order; order-by
/// style drains plug in their own.
pub type StateComparer = Arc<dyn Fn(&FeedRangeState, &FeedRangeState) -> Ordering + Send + Sync>;

fn range_order() -> StateComparer {
    Arc::new(|a, b| a.range.cmp(&b.range))
}

/// One page of a cross-partition drain.
#[derive(Debug, Clone)]
pub struct CrossPartitionPage {
    /// The page itself, drawn from a single range.
    pub page: FeedPage,
    /// State of every unfinished range as of this page, the current one
    /// included. Empty once the drain is complete.
    pub state: CrossFeedRangeState,
}

impl CrossPartitionPage {
    /// Serialized continuation token, or `None` when the drain finished.
    pub fn continuation_token(&self) -> Result<Option<String>> {
        if self.state.is_empty() {
            return Ok(None);
        }
        self.state.to_continuation_token().map(Some)
    }
}

/// Merges per-range page streams into one resumable sequence.
///
/// `S` is the per-range page source and `factory` builds one from a
/// [`FeedRangeState`]; the engine itself never talks to the store
/// directly, only through the factory and the [`FeedRangeProvider`].
pub struct CrossPartitionEnumerator<S, F> {
    provider: Arc<dyn FeedRangeProvider>,
    factory: F,
    config: PaginationConfig,
    comparer: StateComparer,
    /// Enumerators that have not yet delivered a page, in creation order.
    /// Drained before `active` so split children are read promptly.
    pending: VecDeque<Arc<BufferedEnumerator<S>>>,
    /// Enumerators with at least one delivered page, drained in range
    /// order.
    active: Vec<Arc<BufferedEnumerator<S>>>,
    initialized: bool,
    resume: Option<CrossFeedRangeState>,
}

impl<S, F> CrossPartitionEnumerator<S, F>
where
    S: PageSource + 'static,
    F: Fn(FeedRangeState) -> S,
{
    /// Start a fresh drain over all current feed ranges.
    pub fn new(
        provider: Arc<dyn FeedRangeProvider>,
        factory: F,
        config: PaginationConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            factory,
            config,
            comparer: range_order(),
            pending: VecDeque::new(),
            active: Vec::new(),
            initialized: false,
            resume: None,
        })
    }

    /// Replace the default increasing-key drain order.
    pub fn with_comparer(mut self, comparer: StateComparer) -> Self {
        self.comparer = comparer;
        self
    }

    /// Resume a drain from a previously captured state.
    pub fn with_resume_state(
        provider: Arc<dyn FeedRangeProvider>,
        factory: F,
        config: PaginationConfig,
        state: CrossFeedRangeState,
    ) -> Result<Self> {
        let mut enumerator = Self::new(provider, factory, config)?;
        enumerator.resume = Some(state);
        Ok(enumerator)
    }

    /// State of every unfinished range, in range order.
    pub fn state(&self) -> CrossFeedRangeState {
        let mut states: Vec<FeedRangeState> = self
            .pending
            .iter()
            .chain(self.active.iter())
            .filter(|e| e.has_more())
            .map(|e| e.state())
            .collect();
        states.sort_by(|a, b| (self.comparer)(a, b));
        CrossFeedRangeState::new(states)
    }

    /// Yield the next page, or `None` once every range is drained.
    ///
    /// # Errors
    ///
    /// `Gone` failures are resolved internally up to
    /// `max_gone_retries` times per call. Anything else, throttles
    /// included, is returned verbatim with the drain position unchanged,
    /// so calling again retries the same page.
    pub async fn next_page(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<CrossPartitionPage>> {
        cancel.check()?;
        self.ensure_initialized(cancel).await?;

        let mut gone_retries: u32 = 0;
        loop {
            self.active.retain(|e| e.has_more());

            let current = match self.take_next() {
                Some(current) => current,
                None => return Ok(None),
            };

            let idle = self.idle_prefetchers();
            let (fetched, prefetched) = tokio::join!(
                current.advance(cancel),
                prefetch_in_parallel(idle, self.config.max_concurrent_prefetch, cancel),
            );
            if let Err(err) = prefetched {
                // Buffered failures resurface on delivery; nothing to do
                // here beyond noting it.
                debug!(error = %err, "background prefetch failed");
            }

            match fetched {
                Ok(page) => {
                    if current.has_more() {
                        self.active.push(current);
                    }
                    let state = self.state();
                    return Ok(Some(CrossPartitionPage { page, state }));
                }
                Err(Error::Gone { range }) => {
                    gone_retries += 1;
                    if gone_retries > self.config.max_gone_retries {
                        warn!(%range, retries = gone_retries, "giving up on stale range");
                        return Err(Error::Gone { range });
                    }
                    self.resolve_stale_range(current, range, cancel).await?;
                }
                Err(err) => {
                    // Position is unchanged on failure; keep the
                    // enumerator first in line so a retry reissues the
                    // same page.
                    self.pending.push_front(current);
                    return Err(err);
                }
            }
        }
    }

    async fn ensure_initialized(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        let states = match self.resume.take() {
            Some(resume) => resume.states,
            None => {
                let ranges = self.provider.get_feed_ranges(cancel).await?;
                ranges.into_iter().map(FeedRangeState::beginning).collect()
            }
        };

        debug!(ranges = states.len(), "starting cross-partition drain");
        for state in states {
            self.pending
                .push_back(Arc::new(BufferedEnumerator::new((self.factory)(state))));
        }
        self.initialized = true;
        Ok(())
    }

    /// Pick the enumerator to drain next: unread ones first in creation
    /// order, then started ones per the comparer.
    fn take_next(&mut self) -> Option<Arc<BufferedEnumerator<S>>> {
        if let Some(current) = self.pending.pop_front() {
            return Some(current);
        }

        let index = self
            .active
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (self.comparer)(&a.state(), &b.state()))
            .map(|(index, _)| index)?;
        Some(self.active.swap_remove(index))
    }

    /// Idle enumerators to advance in the background, per the configured
    /// policy. The current enumerator is already removed from both queues.
    fn idle_prefetchers(&self) -> Vec<Arc<dyn Prefetcher>> {
        match self.config.prefetch_policy {
            PrefetchPolicy::None => Vec::new(),
            PrefetchPolicy::SinglePageAhead => {
                let next = self.pending.front().cloned().or_else(|| {
                    self.active
                        .iter()
                        .min_by(|a, b| (self.comparer)(&a.state(), &b.state()))
                        .cloned()
                });
                next.map(|e| vec![e as Arc<dyn Prefetcher>]).unwrap_or_default()
            }
            PrefetchPolicy::All => self
                .pending
                .iter()
                .chain(self.active.iter())
                .cloned()
                .map(|e| e as Arc<dyn Prefetcher>)
                .collect(),
        }
    }

    /// Replace or reroute an enumerator whose routed range is no longer
    /// live. `range` is the routing range the failed read addressed; the
    /// enumerator's own range may be a sub-range of it after an earlier
    /// merge.
    async fn resolve_stale_range(
        &mut self,
        current: Arc<BufferedEnumerator<S>>,
        range: HashRange,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.provider.refresh(cancel).await?;
        let FeedRangeState {
            range: own_range,
            continuation,
        } = current.state();

        match self.provider.get_child_ranges(&range, cancel).await? {
            RangeResolution::Split(children) => {
                debug!(%range, children = children.len(), "range split, fanning out");
                for child in children {
                    // Fan out only over the part of each child this
                    // enumerator was responsible for.
                    let Some(sub_range) = child.intersection(&own_range) else {
                        continue;
                    };
                    let state = FeedRangeState {
                        range: sub_range,
                        continuation,
                    };
                    let next = BufferedEnumerator::new((self.factory)(state));
                    if sub_range != child {
                        // The intersection is not a live range of its own;
                        // route reads through the child and filter down.
                        next.reroute(child).await;
                    }
                    self.pending.push_back(Arc::new(next));
                }
                Ok(())
            }
            RangeResolution::Merged(merged) => {
                debug!(%range, %merged, "range merged, rerouting");
                current.reroute(merged).await;
                self.pending.push_back(current);
                Ok(())
            }
            RangeResolution::Current(_) => {
                // The refreshed snapshot still lists the range; reissue.
                self.pending.push_front(current);
                Ok(())
            }
            RangeResolution::Unknown => Err(Error::UnknownRange { range }),
        }
    }
}

/// Drain a [`PartitionedStore`] from the beginning.
pub fn read_feed(
    store: Arc<PartitionedStore>,
    config: PaginationConfig,
) -> Result<
    CrossPartitionEnumerator<
        PartitionRangeEnumerator,
        impl Fn(FeedRangeState) -> PartitionRangeEnumerator,
    >,
> {
    let provider = Arc::new(StoreFeedRangeProvider::new(store.clone()));
    let page_size = config.page_size;
    let factory =
        move |state: FeedRangeState| PartitionRangeEnumerator::new(store.clone(), state, page_size);
    CrossPartitionEnumerator::new(provider, factory, config)
}

/// Resume a drain of a [`PartitionedStore`] from a serialized token.
pub fn resume_feed(
    store: Arc<PartitionedStore>,
    config: PaginationConfig,
    token: &str,
) -> Result<
    CrossPartitionEnumerator<
        PartitionRangeEnumerator,
        impl Fn(FeedRangeState) -> PartitionRangeEnumerator + use<>,
    >,
> {
    let state = CrossFeedRangeState::from_continuation_token(token)?;
    let provider = Arc::new(StoreFeedRangeProvider::new(store.clone()));
    let page_size = config.page_size;
    let factory =
        move |state: FeedRangeState| PartitionRangeEnumerator::new(store.clone(), state, page_size);
    CrossPartitionEnumerator::with_resume_state(provider, factory, config, state)
}
