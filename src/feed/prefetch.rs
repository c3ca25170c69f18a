//! Bounded-concurrency parallel prefetch.
//!
//! [`prefetch_in_parallel`] runs a batch of independent single-step fetch
//! operations with a hard bound on how many execute at once. It is how the
//! cross-partition enumerator reads ahead on idle ranges without blocking
//! the consumer.
//!
//! Guarantees:
//!
//! - `max_concurrency == 0` is a no-op fast path: zero work is started.
//! - `max_concurrency >= prefetchers.len()` starts everything immediately.
//! - At no instant are more than `max_concurrency` prefetchers executing,
//!   including while a prefetcher is suspended awaiting sub-operations.
//! - No prefetcher is invoked more than once per call, and never
//!   concurrently with itself.
//! - All launched prefetchers are awaited to settlement before returning;
//!   the first failure (if any) is then propagated.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::error::Result;

/// One idempotent read-ahead step.
///
/// Implementations must tolerate `prefetch` never being called and must be
/// a no-op when their work is already done or in flight.
#[async_trait]
pub trait Prefetcher: Send + Sync {
    async fn prefetch(&self, cancel: &CancellationToken) -> Result<()>;
}

/// Run every prefetcher to completion with at most `max_concurrency`
/// executing at any instant.
pub async fn prefetch_in_parallel(
    prefetchers: Vec<Arc<dyn Prefetcher>>,
    max_concurrency: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    if max_concurrency == 0 || prefetchers.is_empty() {
        return Ok(());
    }

    cancel.check()?;

    let total = prefetchers.len();
    debug!(total, max_concurrency, "starting parallel prefetch");

    let mut results = stream::iter(prefetchers.into_iter().map(|prefetcher| {
        let cancel = cancel.clone();
        async move { prefetcher.prefetch(&cancel).await }
    }))
    .buffer_unordered(max_concurrency);

    // Let every launched prefetcher settle before propagating anything,
    // so a failure does not strand half-started work.
    let mut first_failure = None;
    while let Some(result) = results.next().await {
        if let Err(err) = result {
            if first_failure.is_none() {
                first_failure = Some(err);
            }
        }
    }

    match first_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks how many prefetches run at once, across await points.
    struct GaugedPrefetcher {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Prefetcher for GaugedPrefetcher {
        async fn prefetch(&self, _cancel: &CancellationToken) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            // Suspend while "in flight" so overlapping invocations are
            // observable by the gauge.
            tokio::time::sleep(Duration::from_millis(5)).await;

            self.current.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::throttled())
            } else {
                Ok(())
            }
        }
    }

    fn gauged_batch(
        n: usize,
        failures: usize,
    ) -> (Vec<Arc<dyn Prefetcher>>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let batch: Vec<Arc<dyn Prefetcher>> = (0..n)
            .map(|i| {
                Arc::new(GaugedPrefetcher {
                    current: current.clone(),
                    peak: peak.clone(),
                    calls: calls.clone(),
                    fail: i < failures,
                }) as Arc<dyn Prefetcher>
            })
            .collect();
        (batch, peak, calls)
    }

    #[tokio::test]
    async fn zero_concurrency_does_zero_work() {
        let (batch, _peak, calls) = gauged_batch(8, 0);
        let cancel = CancellationToken::new();
        prefetch_in_parallel(batch, 0, &cancel).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrency_bound_is_respected() {
        for k in [1usize, 2, 64] {
            let (batch, peak, calls) = gauged_batch(10, 0);
            let cancel = CancellationToken::new();
            prefetch_in_parallel(batch, k, &cancel).await.unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 10);
            assert!(
                peak.load(Ordering::SeqCst) <= k,
                "peak {} exceeded bound {k}",
                peak.load(Ordering::SeqCst)
            );
        }
    }

    #[tokio::test]
    async fn each_prefetcher_runs_exactly_once() {
        let (batch, _peak, calls) = gauged_batch(7, 0);
        let cancel = CancellationToken::new();
        prefetch_in_parallel(batch, 3, &cancel).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn failures_surface_after_all_settle() {
        let (batch, _peak, calls) = gauged_batch(6, 2);
        let cancel = CancellationToken::new();
        let err = prefetch_in_parallel(batch, 2, &cancel).await.unwrap_err();
        assert!(err.is_retryable());
        // Every prefetcher still ran despite the early failures.
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn cancelled_batch_starts_nothing() {
        let (batch, _peak, calls) = gauged_batch(4, 0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = prefetch_in_parallel(batch, 2, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
