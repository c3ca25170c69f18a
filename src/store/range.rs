//! Hash-key ranges.
//!
//! A [`HashRange`] is a half-open interval `[start, end)` over the `u64`
//! key space. `None` bounds mean unbounded: `start: None` is the lowest
//! possible key, `end: None` is just past the highest. At any point in
//! time the live ranges of a store partition the key space disjointly and
//! exhaustively.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper end of the key space, exclusive, in widened arithmetic.
const KEY_SPACE_END: u128 = 1 << 64;

/// Half-open interval `[start, end)` over the partition key hash space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashRange {
    /// Inclusive lower bound; `None` = unbounded-low.
    #[serde(rename = "min")]
    pub start: Option<u64>,
    /// Exclusive upper bound; `None` = unbounded-high.
    #[serde(rename = "max")]
    pub end: Option<u64>,
}

impl HashRange {
    /// Range covering the entire key space.
    pub fn full() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Range `[start, end)` with concrete bounds.
    pub fn new(start: Option<u64>, end: Option<u64>) -> Self {
        Self { start, end }
    }

    fn lo(&self) -> u128 {
        self.start.map(u128::from).unwrap_or(0)
    }

    fn hi(&self) -> u128 {
        self.end.map(u128::from).unwrap_or(KEY_SPACE_END)
    }

    /// Whether the range contains no keys.
    pub fn is_empty(&self) -> bool {
        self.lo() >= self.hi()
    }

    /// Whether `hash` falls inside this range.
    pub fn contains(&self, hash: u64) -> bool {
        let h = u128::from(hash);
        h >= self.lo() && h < self.hi()
    }

    /// Whether `other` is entirely inside this range.
    pub fn contains_range(&self, other: &HashRange) -> bool {
        self.lo() <= other.lo() && other.hi() <= self.hi()
    }

    /// Whether this range and `other` share at least one key.
    pub fn overlaps(&self, other: &HashRange) -> bool {
        self.lo() < other.hi() && other.lo() < self.hi()
    }

    /// Whether this range ends exactly where `other` begins, or vice versa.
    pub fn is_adjacent_to(&self, other: &HashRange) -> bool {
        self.hi() == other.lo() || other.hi() == self.lo()
    }

    /// Split into two disjoint halves at the key-space midpoint.
    ///
    /// Returns `None` when the range holds fewer than two keys and cannot
    /// be divided further.
    pub fn split(&self) -> Option<(HashRange, HashRange)> {
        let (lo, hi) = (self.lo(), self.hi());
        if hi - lo < 2 {
            return None;
        }

        let mid = (lo + (hi - lo) / 2) as u64;
        let left = HashRange::new(self.start, Some(mid));
        let right = HashRange::new(Some(mid), self.end);
        Some((left, right))
    }

    /// Overlap of this range and `other`, or `None` when they are
    /// disjoint.
    pub fn intersection(&self, other: &HashRange) -> Option<HashRange> {
        if !self.overlaps(other) {
            return None;
        }

        let start = if self.lo() >= other.lo() {
            self.start
        } else {
            other.start
        };
        let end = if self.hi() <= other.hi() {
            self.end
        } else {
            other.end
        };
        Some(HashRange::new(start, end))
    }

    /// Union of two adjacent ranges.
    ///
    /// Returns `None` when the ranges do not share a boundary; merging
    /// non-adjacent ranges would punch a hole in the key space.
    pub fn merge(a: &HashRange, b: &HashRange) -> Option<HashRange> {
        let (low, high) = if a.hi() == b.lo() {
            (a, b)
        } else if b.hi() == a.lo() {
            (b, a)
        } else {
            return None;
        };

        Some(HashRange::new(low.start, high.end))
    }
}

impl PartialOrd for HashRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HashRange {
    /// Total order by lower bound, then upper bound; this is the default
    /// cross-partition drain order (increasing key).
    fn cmp(&self, other: &Self) -> Ordering {
        self.lo()
            .cmp(&other.lo())
            .then_with(|| self.hi().cmp(&other.hi()))
    }
}

impl fmt::Display for HashRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self
            .start
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-inf".to_string());
        let end = self
            .end
            .map(|e| e.to_string())
            .unwrap_or_else(|| "+inf".to_string());
        write!(f, "[{start}, {end})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_range_contains_extremes() {
        let full = HashRange::full();
        assert!(full.contains(0));
        assert!(full.contains(u64::MAX));
        assert!(!full.is_empty());
    }

    #[test]
    fn split_halves_are_disjoint_and_exhaustive() {
        let (left, right) = HashRange::full().split().unwrap();
        assert!(!left.overlaps(&right));
        assert!(left.is_adjacent_to(&right));
        assert_eq!(HashRange::merge(&left, &right), Some(HashRange::full()));

        let boundary = right.start.unwrap();
        assert!(left.contains(boundary - 1));
        assert!(right.contains(boundary));
    }

    #[test]
    fn repeated_splits_stay_disjoint() {
        let mut leaves = vec![HashRange::full()];
        for _ in 0..6 {
            let next = leaves.pop().unwrap();
            let (l, r) = next.split().unwrap();
            leaves.push(l);
            leaves.push(r);
        }

        leaves.sort();
        for pair in leaves.windows(2) {
            assert!(!pair[0].overlaps(&pair[1]));
        }
    }

    #[test]
    fn intersection_clips_to_the_overlap() {
        let a = HashRange::new(Some(0), Some(20));
        let b = HashRange::new(Some(10), Some(30));
        assert_eq!(a.intersection(&b), Some(HashRange::new(Some(10), Some(20))));
        assert_eq!(b.intersection(&a), Some(HashRange::new(Some(10), Some(20))));

        let inner = HashRange::new(Some(5), Some(15));
        assert_eq!(HashRange::full().intersection(&inner), Some(inner));

        let disjoint = HashRange::new(Some(40), Some(50));
        assert_eq!(a.intersection(&disjoint), None);
    }

    #[test]
    fn merge_rejects_non_adjacent() {
        let a = HashRange::new(Some(0), Some(10));
        let b = HashRange::new(Some(20), Some(30));
        assert_eq!(HashRange::merge(&a, &b), None);
    }

    #[test]
    fn merge_accepts_either_argument_order() {
        let a = HashRange::new(Some(0), Some(10));
        let b = HashRange::new(Some(10), Some(30));
        let merged = HashRange::new(Some(0), Some(30));
        assert_eq!(HashRange::merge(&a, &b), Some(merged));
        assert_eq!(HashRange::merge(&b, &a), Some(merged));
    }

    #[test]
    fn contains_range_is_inclusive_of_self() {
        let r = HashRange::new(Some(5), Some(50));
        assert!(r.contains_range(&r));
        assert!(HashRange::full().contains_range(&r));
        assert!(!r.contains_range(&HashRange::full()));
    }

    #[test]
    fn ordering_is_by_lower_bound() {
        let mut ranges = vec![
            HashRange::new(Some(100), None),
            HashRange::new(None, Some(50)),
            HashRange::new(Some(50), Some(100)),
        ];
        ranges.sort();
        assert_eq!(ranges[0].start, None);
        assert_eq!(ranges[1].start, Some(50));
        assert_eq!(ranges[2].start, Some(100));
    }

    #[test]
    fn serde_uses_min_max_field_names() {
        let r = HashRange::new(Some(1), None);
        let encoded = serde_json::to_string(&r).unwrap();
        assert_eq!(encoded, r#"{"min":1,"max":null}"#);
        let decoded: HashRange = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, r);
    }
}
