//! Integration tests for buffered read-ahead over a live store.
//!
//! The prefetch scheduler's concurrency accounting is covered by unit
//! tests; these exercise the pairing that matters in practice: a batch of
//! `BufferedEnumerator`s prefetched through `prefetch_in_parallel`, then
//! drained, against a store with real routing and failure injection.

use std::collections::HashSet;
use std::sync::Arc;

use crossfeed::cancel::CancellationToken;
use crossfeed::feed::{
    BufferedEnumerator, FeedRangeState, PartitionRangeEnumerator, Prefetcher,
    prefetch_in_parallel,
};
use crossfeed::store::{FailureConfig, HashRange, PartitionedStore, RangeResolution};
use serde_json::json;

type Buffered = BufferedEnumerator<PartitionRangeEnumerator>;

async fn quartered_store(n: usize, failure: FailureConfig) -> Arc<PartitionedStore> {
    let store = Arc::new(PartitionedStore::with_failure_config("/pk", failure));
    let full = HashRange::full();
    store.split(&full).await.unwrap();
    let RangeResolution::Split(halves) = store.resolve_child_ranges(&full).await else {
        panic!("expected split resolution");
    };
    store.split(&halves[0]).await.unwrap();
    store.split(&halves[1]).await.unwrap();

    for i in 0..n {
        store.create_item(json!({ "pk": i })).await.unwrap();
    }
    store
}

async fn leaf_enumerators(store: &Arc<PartitionedStore>, page_size: usize) -> Vec<Arc<Buffered>> {
    store.refresh().await;
    let mut enumerators = Vec::new();
    for range in store.snapshot_ranges().await {
        enumerators.push(Arc::new(BufferedEnumerator::new(
            PartitionRangeEnumerator::new(
                store.clone(),
                FeedRangeState::beginning(range),
                page_size,
            ),
        )));
    }
    enumerators
}

fn as_batch(enumerators: &[Arc<Buffered>]) -> Vec<Arc<dyn Prefetcher>> {
    enumerators
        .iter()
        .map(|e| e.clone() as Arc<dyn Prefetcher>)
        .collect()
}

async fn drain_all(enumerators: &[Arc<Buffered>], cancel: &CancellationToken) -> Vec<String> {
    let mut identifiers = Vec::new();
    for enumerator in enumerators {
        while enumerator.has_more() {
            match enumerator.advance(cancel).await {
                Ok(page) => identifiers.extend(page.identifiers()),
                Err(err) if err.is_retryable() => continue,
                Err(err) => panic!("unexpected failure: {err}"),
            }
        }
    }
    identifiers
}

// ============================================================================
// Prefetch-Then-Drain Tests
// ============================================================================

#[tokio::test]
async fn test_prefetched_drain_yields_the_same_records() {
    let store = quartered_store(60, FailureConfig::default()).await;
    let cancel = CancellationToken::new();

    let prefetched = leaf_enumerators(&store, 10).await;
    prefetch_in_parallel(as_batch(&prefetched), 2, &cancel)
        .await
        .unwrap();
    let with_prefetch = drain_all(&prefetched, &cancel).await;

    let plain = leaf_enumerators(&store, 10).await;
    let without_prefetch = drain_all(&plain, &cancel).await;

    let a: HashSet<_> = with_prefetch.iter().cloned().collect();
    let b: HashSet<_> = without_prefetch.iter().cloned().collect();
    assert_eq!(with_prefetch.len(), 60);
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_bound_of_one_still_prefetches_every_range() {
    let store = quartered_store(40, FailureConfig::default()).await;
    let cancel = CancellationToken::new();

    let enumerators = leaf_enumerators(&store, 100).await;
    prefetch_in_parallel(as_batch(&enumerators), 1, &cancel)
        .await
        .unwrap();

    // Each enumerator has its (only) page buffered: a single advance per
    // range recovers the whole store.
    let mut identifiers = Vec::new();
    for enumerator in &enumerators {
        identifiers.extend(enumerator.advance(&cancel).await.unwrap().identifiers());
    }
    let unique: HashSet<_> = identifiers.iter().cloned().collect();
    assert_eq!(unique.len(), 40);
}

// ============================================================================
// Failure Handling Tests
// ============================================================================

#[tokio::test]
async fn test_batch_failure_is_reported_and_drain_still_completes() {
    let store = quartered_store(
        40,
        FailureConfig {
            inject_throttles: true,
            ..Default::default()
        },
    )
    .await;
    let cancel = CancellationToken::new();

    let enumerators = leaf_enumerators(&store, 10).await;
    // Four concurrent reads consume calls 1-4; the odd ones throttle, so
    // the batch settles everything and then reports the failure.
    let err = prefetch_in_parallel(as_batch(&enumerators), 4, &cancel)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let identifiers = drain_all(&enumerators, &cancel).await;
    let unique: HashSet<_> = identifiers.iter().cloned().collect();
    assert_eq!(unique.len(), 40);
}

#[tokio::test]
async fn test_cancelled_batch_consumes_no_reads() {
    let store = Arc::new(PartitionedStore::with_failure_config(
        "/pk",
        FailureConfig {
            inject_throttles: true,
            ..Default::default()
        },
    ));
    for i in 0..10 {
        store.create_item(json!({ "pk": i })).await.unwrap();
    }

    let enumerator = Arc::new(BufferedEnumerator::new(PartitionRangeEnumerator::new(
        store.clone(),
        FeedRangeState::beginning(HashRange::full()),
        10,
    )));

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = prefetch_in_parallel(
        vec![enumerator.clone() as Arc<dyn Prefetcher>],
        4,
        &cancelled,
    )
    .await
    .unwrap_err();
    assert!(err.is_cancelled());

    // Throttles fire on odd read calls. The first live read being call
    // one proves the cancelled batch never reached the store.
    let live = CancellationToken::new();
    let first = enumerator.advance(&live).await;
    assert!(first.unwrap_err().is_retryable());
    let second = enumerator.advance(&live).await.unwrap();
    assert_eq!(second.records.len(), 10);
}
