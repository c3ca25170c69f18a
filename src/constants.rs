//! Centralized pagination and store constants.
//!
//! This module consolidates the magic numbers used throughout crossfeed.
//! Having them in one place makes it easier to:
//!
//! - Understand the pagination contract constraints
//! - Update values consistently
//! - Document the rationale for each constant

// =============================================================================
// Pagination Constants
// =============================================================================

/// Default number of records returned per feed page.
///
/// Small enough that multi-page drains (and therefore continuation handling)
/// are exercised even by modest datasets; callers override via
/// `PaginationConfig::page_size`.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Maximum number of times the cross-partition enumerator re-resolves a
/// stale range (`Gone`) within one logical `next_page` call before
/// surfacing the failure.
///
/// Each split doubles the affected range's partition count, so 16 levels of
/// lineage cover far more topology churn than a single drain will observe.
pub const DEFAULT_MAX_GONE_RETRIES: u32 = 16;

// =============================================================================
// Throttling Constants
// =============================================================================

/// Numeric status carried by a throttle failure (HTTP 429 equivalent).
pub const THROTTLE_STATUS: u16 = 429;

/// Suggested backoff carried by an injected throttle failure, in
/// milliseconds. The enumerator never sleeps on this value; it is a hint
/// for the caller's retry policy.
pub const DEFAULT_RETRY_AFTER_MS: u64 = 100;

// =============================================================================
// Prefetch Constants
// =============================================================================

/// Default bound on concurrently executing prefetchers.
///
/// Matches the initial partition fan-out of a typical test topology;
/// raising it only helps when more partitions than this are idle at once.
pub const DEFAULT_MAX_CONCURRENT_PREFETCH: usize = 8;

// =============================================================================
// Envelope Constants
// =============================================================================

/// Container resource id stamped on every page envelope (`_rid`).
///
/// The in-memory store models a single logical container; consumers treat
/// the value as opaque.
pub const CONTAINER_RID: &str = "crossfeed-container-0";
