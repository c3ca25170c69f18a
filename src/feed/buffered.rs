//! Read-ahead buffering for a single page source.
//!
//! [`BufferedEnumerator`] wraps one [`PageSource`] with an internal queue
//! of already-fetched results so a consumer can pull pages while
//! background prefetches continue on other ranges. Buffering changes when
//! fetch work happens, never page content or order; buffered failures are
//! delivered in position exactly as a synchronous fetch would have
//! surfaced them.
//!
//! The consumer-visible state only advances when a page is *delivered*,
//! not when it is prefetched. A `CrossFeedRangeState` captured mid-drain
//! therefore never skips a prefetched-but-unconsumed page.

use std::collections::VecDeque;
use std::sync::Mutex as SyncMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::store::HashRange;

use super::enumerator::PageSource;
use super::page::FeedPage;
use super::prefetch::Prefetcher;
use super::state::FeedRangeState;

struct Inner<S> {
    source: S,
    buffer: VecDeque<Result<FeedPage>>,
}

/// A [`PageSource`] with an internal read-ahead queue.
///
/// Shared by `Arc`: the cross-partition layer advances it while the
/// prefetch scheduler calls [`Prefetcher::prefetch`] on idle instances.
pub struct BufferedEnumerator<S> {
    inner: Mutex<Inner<S>>,
    /// State as of the last *delivered* page.
    delivered: SyncMutex<FeedRangeState>,
    /// False once a terminal page has been delivered.
    more: AtomicBool,
}

impl<S: PageSource> BufferedEnumerator<S> {
    pub fn new(source: S) -> Self {
        let state = source.state();
        Self {
            inner: Mutex::new(Inner {
                source,
                buffer: VecDeque::new(),
            }),
            delivered: SyncMutex::new(state),
            more: AtomicBool::new(true),
        }
    }

    /// Consumer-visible range + continuation.
    pub fn state(&self) -> FeedRangeState {
        *self.delivered.lock().expect("state lock poisoned")
    }

    /// Whether another delivered page can carry records.
    pub fn has_more(&self) -> bool {
        self.more.load(Ordering::Acquire)
    }

    /// Deliver the next page, preferring the buffer over a fresh fetch.
    pub async fn advance(&self, cancel: &CancellationToken) -> Result<FeedPage> {
        let mut inner = self.inner.lock().await;

        let result = match inner.buffer.pop_front() {
            Some(buffered) => buffered,
            None => {
                cancel.check()?;
                inner.source.advance(cancel).await
            }
        };

        if let Ok(page) = &result {
            match page.state {
                Some(state) => {
                    *self.delivered.lock().expect("state lock poisoned") = state;
                }
                None => self.more.store(false, Ordering::Release),
            }
        }

        result
    }

    /// Route subsequent fetches through a merged range, keeping the
    /// source's own range and continuation.
    ///
    /// The buffer is cleared: anything fetched under the stale routing is
    /// a failure the new routing supersedes.
    pub async fn reroute(&self, routing: HashRange) {
        let mut inner = self.inner.lock().await;
        inner.buffer.clear();
        inner.source.reroute(routing);
    }
}

#[async_trait]
impl<S: PageSource + 'static> Prefetcher for BufferedEnumerator<S> {
    /// Idempotent single-page read-ahead: a no-op when a result is already
    /// buffered, the source is exhausted, or cancellation was observed.
    async fn prefetch(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() || !self.has_more() {
            return Ok(());
        }

        let mut inner = self.inner.lock().await;
        if !inner.buffer.is_empty() {
            return Ok(());
        }

        let result = inner.source.advance(cancel).await;
        if !matches!(&result, Err(e) if e.is_cancelled()) {
            inner.buffer.push_back(result);
        }
        Ok(())
    }
}
