//! Pagination configuration.
//!
//! A single validated struct covers the knobs a drain needs; everything has
//! a documented default so `PaginationConfig::default()` is a working
//! setup for tests and examples.

use crate::constants::{
    DEFAULT_MAX_CONCURRENT_PREFETCH, DEFAULT_MAX_GONE_RETRIES, DEFAULT_PAGE_SIZE,
};
use crate::error::{Error, Result};
use crate::feed::PrefetchPolicy;

/// Configuration for a cross-partition drain.
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// Records per page requested from the store.
    pub page_size: usize,

    /// How many times a `Gone` failure is re-resolved within one logical
    /// `next_page` call before the failure is surfaced.
    pub max_gone_retries: u32,

    /// Whether idle enumerators are advanced in the background while the
    /// consumer processes the current page. Never changes yield order,
    /// only latency.
    pub prefetch_policy: PrefetchPolicy,

    /// Bound on concurrently executing background prefetches. Zero is
    /// valid and means background prefetch performs no work even when the
    /// policy requests it.
    pub max_concurrent_prefetch: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_gone_retries: DEFAULT_MAX_GONE_RETRIES,
            prefetch_policy: PrefetchPolicy::None,
            max_concurrent_prefetch: DEFAULT_MAX_CONCURRENT_PREFETCH,
        }
    }
}

impl PaginationConfig {
    /// Validate invariants that the rest of the crate relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `page_size` is zero (a drain
    /// could never make progress) or `max_gone_retries` is zero (a single
    /// split would abort the drain).
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }

        if self.max_gone_retries == 0 {
            return Err(Error::InvalidConfig(
                "max_gone_retries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
