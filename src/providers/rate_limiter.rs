//! Rate limiter trait.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Request rate limiter keyed by an arbitrary string (client IP for
/// checkout).
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Atomically count this attempt against the window and reject it when
    /// the window already holds `max_requests`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::RateLimited`] when over the limit, or
    /// a store error when the backend is unreachable.
    async fn check_and_record(&self, key: &str, max_requests: u32, window: Duration)
        -> Result<()>;

    /// Clear the window for a key.
    async fn reset(&self, key: &str) -> Result<()>;
}
