//! In-memory partitioned document store.
//!
//! The store owns hash-range-to-partition routing, record storage, and the
//! split/merge mutations that reshape routing while reads are in flight.
//! It is the collaborator the enumerator stack is written against: real
//! deployments substitute a network-attached container with the same
//! contract.
//!
//! # Routing
//!
//! Every live partition owns exactly one [`HashRange`]; live ranges are
//! disjoint and cover the full key space. Page reads route by exact range:
//! a read against a range with no current mapping fails with
//! [`Error::Gone`] and the caller must re-resolve child ranges via the
//! feed range provider. After a merge the caller keeps draining its
//! original sub-range by routing through the merged range with a filter
//! (see [`PartitionedStore::read_feed_page_within`]). Split and merge
//! retire partition ids and record parent-to-children lineage for those
//! resolutions.
//!
//! # Concurrency
//!
//! Interior state sits behind a single `tokio::sync::RwLock`: split/merge
//! take the write lock, so routing mutations serialize against concurrent
//! page reads, and the rehash swaps the new partition set in atomically
//! before the old routing is discarded.
//!
//! # Failure injection
//!
//! [`FailureConfig`] deterministically injects throttle failures and/or
//! empty pages on every other page read, which is how the drain-level
//! transparency properties are exercised.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::hash::hash_partition_key;
use super::range::HashRange;
use super::record::{PartitionId, Record, Records, ResourceId};

/// Per-partition read position: either the very beginning of the feed or
/// resumption strictly after a composite ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Continuation {
    /// No records seen yet for this range.
    Beginning,
    /// Resume with records whose ResourceId is strictly greater.
    Resume { last: ResourceId },
}

impl Continuation {
    /// Whether `rid` comes after this continuation.
    pub fn admits(&self, rid: ResourceId) -> bool {
        match self {
            Continuation::Beginning => true,
            Continuation::Resume { last } => rid > *last,
        }
    }
}

/// One page of a partition read.
#[derive(Debug, Clone)]
pub struct ReadPage {
    /// Records in composite-key order.
    pub records: Vec<Record>,
    /// Position for the next read; `None` means this leg of the feed is
    /// exhausted.
    pub next: Option<Continuation>,
}

/// Deterministic failure injection for page reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureConfig {
    /// Fail every other page read with a throttle (429-equivalent) error.
    pub inject_throttles: bool,
    /// Return an empty, non-terminal page on every other page read.
    pub inject_empty_pages: bool,
}

#[derive(Debug)]
struct Partition {
    range: HashRange,
    records: Records,
    /// Creation index allocator for records originating here.
    next_index: u64,
}

#[derive(Debug)]
struct StoreState {
    live: BTreeMap<PartitionId, Partition>,
    /// Routing snapshot served to `snapshot_ranges` until `refresh`.
    cached: BTreeMap<PartitionId, HashRange>,
    /// Parent partition id to the children that replaced it. Two entries
    /// for a split, one (shared) entry for each merge source.
    lineage: HashMap<PartitionId, Vec<PartitionId>>,
    /// Every range that has ever been live; distinguishes routing-stale
    /// reads (Gone) from ranges that never existed (UnknownRange).
    known_ranges: HashSet<HashRange>,
    next_partition_id: PartitionId,
    next_identifier: u64,
}

impl StoreState {
    fn live_partition_for_hash(&self, hash: u64) -> Option<PartitionId> {
        self.live
            .iter()
            .find(|(_, p)| p.range.contains(hash))
            .map(|(id, _)| *id)
    }

    fn live_partition_for_range(&self, range: &HashRange) -> Option<PartitionId> {
        self.live
            .iter()
            .find(|(_, p)| p.range == *range)
            .map(|(id, _)| *id)
    }

    fn routing_failure(&self, range: &HashRange) -> Error {
        if self.known_ranges.contains(range) {
            Error::Gone { range: *range }
        } else {
            Error::UnknownRange { range: *range }
        }
    }

    fn allocate_partition(&mut self, range: HashRange) -> PartitionId {
        let id = self.next_partition_id;
        self.next_partition_id += 1;
        self.known_ranges.insert(range);
        self.live.insert(
            id,
            Partition {
                range,
                records: Records::new(),
                next_index: 0,
            },
        );
        id
    }
}

/// How a stale range maps onto the current routing. Returned by
/// [`PartitionedStore::resolve_child_ranges`] and surfaced through the
/// feed range provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeResolution {
    /// The range is still live as-is.
    Current(HashRange),
    /// The range was split; these leaves now cover it, in increasing order.
    Split(Vec<HashRange>),
    /// A merge absorbed the range into this strictly larger one.
    Merged(HashRange),
    /// The range was never part of this store's routing.
    Unknown,
}

/// In-memory horizontally-partitioned document store.
///
/// Clone-free; share via `Arc`. All operations are async and take `&self`.
#[derive(Debug)]
pub struct PartitionedStore {
    /// JSON pointer-style path ("/pk") of the partition key in payloads.
    key_path: String,
    failure: FailureConfig,
    /// Page-read counter driving every-other-call failure injection.
    /// Outside the lock so reads stay concurrent with each other.
    read_calls: AtomicU64,
    state: RwLock<StoreState>,
}

impl PartitionedStore {
    /// Store with a single partition covering the full key space.
    ///
    /// `key_path` names the payload field holding the partition key,
    /// e.g. `"/pk"`.
    pub fn new(key_path: &str) -> Self {
        Self::with_failure_config(key_path, FailureConfig::default())
    }

    /// Store with deterministic failure injection enabled.
    pub fn with_failure_config(key_path: &str, failure: FailureConfig) -> Self {
        let mut state = StoreState {
            live: BTreeMap::new(),
            cached: BTreeMap::new(),
            lineage: HashMap::new(),
            known_ranges: HashSet::new(),
            next_partition_id: 0,
            next_identifier: 0,
        };
        state.allocate_partition(HashRange::full());
        state.cached = state
            .live
            .iter()
            .map(|(id, p)| (*id, p.range))
            .collect();

        Self {
            key_path: key_path.to_string(),
            failure,
            read_calls: AtomicU64::new(0),
            state: RwLock::new(state),
        }
    }

    fn partition_key_of(&self, payload: &Value) -> Value {
        let mut current = payload.clone();
        for token in self.key_path.split('/').filter(|t| !t.is_empty()) {
            current = current.get(token).cloned().unwrap_or(Value::Null);
        }
        current
    }

    /// Append a new record, routed by the payload's partition key hash.
    pub async fn create_item(&self, payload: Value) -> Result<Record> {
        let key = self.partition_key_of(&payload);
        let hash = hash_partition_key(&key);

        let mut state = self.state.write().await;
        let id = state
            .live_partition_for_hash(hash)
            .expect("live ranges cover the full key space");

        let identifier = format!("doc-{}", state.next_identifier);
        state.next_identifier += 1;

        let partition = state.live.get_mut(&id).expect("routed to a live partition");
        let record = Record {
            resource_id: ResourceId::new(id, partition.next_index),
            timestamp: Utc::now(),
            identifier,
            payload,
        };
        partition.next_index += 1;
        partition.records.push(record.clone());

        debug!(partition = id, rid = %record.resource_id, "created item");
        Ok(record)
    }

    /// Point-read by partition key and logical document id.
    pub async fn read_item(&self, partition_key: &Value, identifier: &str) -> Result<Record> {
        let hash = hash_partition_key(partition_key);
        let state = self.state.read().await;
        let id = state
            .live_partition_for_hash(hash)
            .expect("live ranges cover the full key space");

        state.live[&id]
            .records
            .iter()
            .find(|r| {
                r.identifier == identifier && self.partition_key_of(&r.payload) == *partition_key
            })
            .cloned()
            .ok_or_else(|| Error::NotFound {
                identifier: identifier.to_string(),
            })
    }

    /// One page of the read feed for `range`.
    ///
    /// Routing is by exact range: if no live partition owns exactly this
    /// range the read fails with [`Error::Gone`] (once-live range) or
    /// [`Error::UnknownRange`] (never existed). Returned records have key
    /// hashes inside `range` and ResourceIds strictly greater than the
    /// continuation, in composite-key order, so repeated reads with
    /// monotonically advancing continuations neither skip nor duplicate.
    pub async fn read_feed_page(
        &self,
        range: &HashRange,
        continuation: Continuation,
        page_size: usize,
    ) -> Result<ReadPage> {
        self.read_feed_page_within(range, range, continuation, page_size)
            .await
    }

    /// One page of the read feed for `filter`, routed through `routing`.
    ///
    /// This is the merge-recovery read: after `filter`'s partition is
    /// absorbed into a larger one, the caller resolves the merged range
    /// and keeps draining its original sub-range through it. `filter` must
    /// be inside `routing`; records outside `filter` belong to sibling
    /// sub-range drains and are never returned here.
    pub async fn read_feed_page_within(
        &self,
        routing: &HashRange,
        filter: &HashRange,
        continuation: Continuation,
        page_size: usize,
    ) -> Result<ReadPage> {
        let call = self.read_calls.fetch_add(1, Ordering::Relaxed) + 1;
        let state = self.state.read().await;

        let Some(id) = state.live_partition_for_range(routing) else {
            return Err(state.routing_failure(routing));
        };

        if self.failure.inject_throttles && call % 2 == 1 {
            debug!(partition = id, call, "injecting throttle");
            return Err(Error::throttled());
        }

        if self.failure.inject_empty_pages && call % 4 == 2 {
            // Non-terminal: the caller keeps its position and re-reads.
            debug!(partition = id, call, "injecting empty page");
            return Ok(ReadPage {
                records: Vec::new(),
                next: Some(continuation),
            });
        }

        let records: Vec<Record> = state.live[&id]
            .records
            .iter()
            .filter(|r| {
                filter.contains(hash_partition_key(&self.partition_key_of(&r.payload)))
                    && continuation.admits(r.resource_id)
            })
            .take(page_size)
            .cloned()
            .collect();

        let next = records.last().map(|last| Continuation::Resume {
            last: last.resource_id,
        });

        Ok(ReadPage { records, next })
    }

    /// Split the partition owning exactly `range` into two children.
    ///
    /// The parent's records are rehashed into the children in their stored
    /// order, preserving ResourceIds, so inherited continuations keep
    /// filtering correctly inside each child range.
    pub async fn split(&self, range: &HashRange) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(parent_id) = state.live_partition_for_range(range) else {
            return Err(state.routing_failure(range));
        };

        let (left_range, right_range) = range.split().ok_or_else(|| {
            Error::InvalidConfig(format!("range {range} is too small to split"))
        })?;

        let parent = state.live.remove(&parent_id).expect("parent is live");
        let left_id = state.allocate_partition(left_range);
        let right_id = state.allocate_partition(right_range);
        state.lineage.insert(parent_id, vec![left_id, right_id]);

        for record in parent.records.into_vec() {
            let hash = hash_partition_key(&self.partition_key_of(&record.payload));
            let child = if left_range.contains(hash) { left_id } else { right_id };
            state
                .live
                .get_mut(&child)
                .expect("children just allocated")
                .records
                .push(record);
        }

        info!(
            parent = parent_id,
            left = left_id,
            right = right_id,
            range = %range,
            "split partition"
        );
        Ok(())
    }

    /// Merge the two adjacent partitions owning exactly `range_a` and
    /// `range_b` into one partition covering their union.
    ///
    /// Records from both sources are combined in composite-key order
    /// (origin partition id, then index) before re-insertion, which keeps
    /// the merged feed consistent with continuations taken against either
    /// source.
    pub async fn merge(&self, range_a: &HashRange, range_b: &HashRange) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(id_a) = state.live_partition_for_range(range_a) else {
            return Err(state.routing_failure(range_a));
        };
        let Some(id_b) = state.live_partition_for_range(range_b) else {
            return Err(state.routing_failure(range_b));
        };

        let merged_range = HashRange::merge(range_a, range_b).ok_or(Error::NonAdjacentRanges {
            left: *range_a,
            right: *range_b,
        })?;

        let source_a = state.live.remove(&id_a).expect("source a is live");
        let source_b = state.live.remove(&id_b).expect("source b is live");
        let merged_id = state.allocate_partition(merged_range);
        state.lineage.insert(id_a, vec![merged_id]);
        state.lineage.insert(id_b, vec![merged_id]);

        let mut combined: Vec<Record> = source_a
            .records
            .into_vec()
            .into_iter()
            .chain(source_b.records.into_vec())
            .collect();
        combined.sort_by_key(|r| r.resource_id);

        let merged = state.live.get_mut(&merged_id).expect("just allocated");
        for record in combined {
            merged.records.push(record);
        }

        info!(
            source_a = id_a,
            source_b = id_b,
            merged = merged_id,
            range = %merged_range,
            "merged partitions"
        );
        Ok(())
    }

    /// Current live partition ids, ascending.
    pub async fn partition_ids(&self) -> Vec<PartitionId> {
        self.state.read().await.live.keys().copied().collect()
    }

    /// Direct children of a retired partition id, if it ever split or
    /// merged.
    pub async fn children_of(&self, id: PartitionId) -> Vec<PartitionId> {
        self.state
            .read()
            .await
            .lineage
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Leaf ranges from the cached routing snapshot, in increasing order.
    ///
    /// The snapshot only advances on [`refresh`](Self::refresh), so a
    /// consumer enumerating from it sees a stable topology until it opts
    /// into a newer one.
    pub async fn snapshot_ranges(&self) -> Vec<HashRange> {
        let state = self.state.read().await;
        let mut ranges: Vec<HashRange> = state.cached.values().copied().collect();
        ranges.sort();
        ranges
    }

    /// Advance the cached routing snapshot to the live routing.
    pub async fn refresh(&self) {
        let mut state = self.state.write().await;
        state.cached = state.live.iter().map(|(id, p)| (*id, p.range)).collect();
        debug!(partitions = state.cached.len(), "refreshed routing snapshot");
    }

    /// Resolve a possibly-stale range against the live routing.
    pub async fn resolve_child_ranges(&self, range: &HashRange) -> RangeResolution {
        let state = self.state.read().await;

        if state.live_partition_for_range(range).is_some() {
            return RangeResolution::Current(*range);
        }

        if !state.known_ranges.contains(range) {
            return RangeResolution::Unknown;
        }

        let mut overlapping: Vec<HashRange> = state
            .live
            .values()
            .map(|p| p.range)
            .filter(|r| r.overlaps(range))
            .collect();
        overlapping.sort();

        match overlapping.as_slice() {
            [single] if single.contains_range(range) => RangeResolution::Merged(*single),
            [] => RangeResolution::Unknown,
            _ => RangeResolution::Split(overlapping),
        }
    }

    /// Total record count across live partitions.
    pub async fn record_count(&self) -> usize {
        self.state
            .read()
            .await
            .live
            .values()
            .map(|p| p.records.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store_with_items(n: usize) -> PartitionedStore {
        let store = PartitionedStore::new("/pk");
        for i in 0..n {
            store.create_item(json!({ "pk": i })).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn create_routes_and_orders_records() {
        let store = store_with_items(5).await;
        assert_eq!(store.record_count().await, 5);

        let page = store
            .read_feed_page(&HashRange::full(), Continuation::Beginning, 10)
            .await
            .unwrap();
        assert_eq!(page.records.len(), 5);
        for pair in page.records.windows(2) {
            assert!(pair[0].resource_id < pair[1].resource_id);
        }
    }

    #[tokio::test]
    async fn split_rehashes_without_losing_records() {
        let store = store_with_items(50).await;
        store.split(&HashRange::full()).await.unwrap();
        assert_eq!(store.record_count().await, 50);
        assert_eq!(store.partition_ids().await.len(), 2);
        assert_eq!(store.children_of(0).await.len(), 2);
    }

    #[tokio::test]
    async fn stale_range_read_is_gone_unknown_range_is_not() {
        let store = store_with_items(10).await;
        store.split(&HashRange::full()).await.unwrap();

        let stale = store
            .read_feed_page(&HashRange::full(), Continuation::Beginning, 10)
            .await;
        assert!(matches!(stale, Err(Error::Gone { .. })));

        let never_existed = HashRange::new(Some(3), Some(17));
        let unknown = store
            .read_feed_page(&never_existed, Continuation::Beginning, 10)
            .await;
        assert!(matches!(unknown, Err(Error::UnknownRange { .. })));
    }

    #[tokio::test]
    async fn snapshot_lags_until_refresh() {
        let store = store_with_items(10).await;
        assert_eq!(store.snapshot_ranges().await.len(), 1);

        store.split(&HashRange::full()).await.unwrap();
        assert_eq!(store.snapshot_ranges().await.len(), 1);

        store.refresh().await;
        assert_eq!(store.snapshot_ranges().await.len(), 2);
    }

    #[tokio::test]
    async fn resolution_reports_split_and_merge() {
        let store = store_with_items(10).await;
        let full = HashRange::full();
        store.split(&full).await.unwrap();

        match store.resolve_child_ranges(&full).await {
            RangeResolution::Split(children) => {
                assert_eq!(children.len(), 2);
                assert_eq!(HashRange::merge(&children[0], &children[1]), Some(full));

                store.merge(&children[0], &children[1]).await.unwrap();
                assert_eq!(
                    store.resolve_child_ranges(&children[0]).await,
                    RangeResolution::Merged(full)
                );
            }
            other => panic!("expected split resolution, got {other:?}"),
        }

        assert_eq!(
            store
                .resolve_child_ranges(&HashRange::new(Some(1), Some(2)))
                .await,
            RangeResolution::Unknown
        );
    }

    #[tokio::test]
    async fn merge_preserves_composite_order() {
        let store = store_with_items(40).await;
        let full = HashRange::full();
        store.split(&full).await.unwrap();
        let children = store.resolve_child_ranges(&full).await;
        let RangeResolution::Split(children) = children else {
            panic!("expected split");
        };

        store.merge(&children[0], &children[1]).await.unwrap();
        let page = store
            .read_feed_page(&full, Continuation::Beginning, 100)
            .await
            .unwrap();
        assert_eq!(page.records.len(), 40);
        for pair in page.records.windows(2) {
            assert!(pair[0].resource_id < pair[1].resource_id);
        }
    }

    #[tokio::test]
    async fn sub_range_read_resumes_through_merged_partition() {
        let store = store_with_items(30).await;
        let full = HashRange::full();
        store.split(&full).await.unwrap();
        let RangeResolution::Split(children) = store.resolve_child_ranges(&full).await else {
            panic!("expected split");
        };

        let whole_child = store
            .read_feed_page(&children[0], Continuation::Beginning, 100)
            .await
            .unwrap();
        let first = store
            .read_feed_page(&children[0], Continuation::Beginning, 5)
            .await
            .unwrap();

        store.merge(&children[0], &children[1]).await.unwrap();
        let direct = store
            .read_feed_page(&children[0], Continuation::Beginning, 5)
            .await;
        assert!(matches!(direct, Err(Error::Gone { .. })));

        // Routing through the merged range resumes the same sub-feed.
        let resumed = store
            .read_feed_page_within(&full, &children[0], first.next.unwrap(), 100)
            .await
            .unwrap();
        let mut ids: Vec<_> = first
            .records
            .iter()
            .chain(resumed.records.iter())
            .map(|r| r.identifier.clone())
            .collect();
        let mut expected: Vec<_> = whole_child
            .records
            .iter()
            .map(|r| r.identifier.clone())
            .collect();
        ids.sort();
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn read_item_finds_and_misses() {
        let store = PartitionedStore::new("/pk");
        let created = store.create_item(json!({ "pk": "a" })).await.unwrap();

        let found = store
            .read_item(&json!("a"), &created.identifier)
            .await
            .unwrap();
        assert_eq!(found, created);

        let missing = store.read_item(&json!("a"), "doc-999").await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn pagination_never_skips_or_duplicates() {
        let store = store_with_items(25).await;
        let mut seen = Vec::new();
        let mut continuation = Continuation::Beginning;

        loop {
            let page = store
                .read_feed_page(&HashRange::full(), continuation, 7)
                .await
                .unwrap();
            seen.extend(page.records.iter().map(|r| r.identifier.clone()));
            match page.next {
                Some(next) => continuation = next,
                None => break,
            }
        }

        let unique: HashSet<_> = seen.iter().cloned().collect();
        assert_eq!(seen.len(), 25);
        assert_eq!(unique.len(), 25);
    }
}
