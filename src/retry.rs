//! Named retry policies for throttle-aware callers.
//!
//! Enumerators never retry internally: a throttle failure is surfaced
//! verbatim with its backoff hint and the caller decides whether to retry.
//! This module gives those callers standardized policies built on the
//! `backon` crate so every drain loop backs off the same way.
//!
//! # Available Policies
//!
//! | Policy | Min Delay | Max Delay | Retries | Use Case |
//! |--------|-----------|-----------|---------|----------|
//! | `throttle_policy` | 100ms | 5s | 10 | 429-style load shedding |
//! | `fast_policy` | 5ms | 100ms | 3 | Tests and hot loops |
//!
//! # Example
//!
//! ```rust,no_run
//! use backon::Retryable;
//! use crossfeed::retry;
//!
//! async fn example() -> Result<(), crossfeed::error::Error> {
//!     // Typically the fallible operation is `cross.next_page(&cancel)`.
//!     let result = (|| async {
//!         Ok::<_, crossfeed::error::Error>(())
//!     })
//!     .retry(retry::throttle_policy())
//!     .when(|e: &crossfeed::error::Error| e.is_retryable())
//!     .await?;
//!
//!     Ok(result)
//! }
//! ```

use std::time::Duration;

use backon::ExponentialBuilder;

/// Policy for throttle (429-equivalent) failures.
///
/// Characteristics:
/// - Initial delay matches the default retry-after hint (100ms)
/// - Long max delay (5s) for sustained load shedding
/// - Many retries (10) since throttling is transient by definition
/// - Includes jitter to prevent thundering herd
pub fn throttle_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(10)
        .with_jitter()
}

/// Policy for tests and hot loops that must converge quickly.
///
/// Characteristics:
/// - Very short delays (5ms-100ms)
/// - Few retries (3)
/// - Includes jitter
pub fn fast_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(100))
        .with_max_times(3)
        .with_jitter()
}
