//! Redis-based rate limiter.
//!
//! Sliding window over a sorted set: old entries are trimmed, the window is
//! counted, and the current attempt recorded, all in one atomic pipeline so
//! concurrent requests cannot slip past the limit between check and record.

use crate::error::{Error, Result};
use crate::providers::RateLimiter;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Redis rate limiter using a sliding window.
#[derive(Clone)]
pub struct RedisRateLimiter {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
}

impl RedisRateLimiter {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| Error::SessionStore(format!("failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            Error::SessionStore(format!("failed to create Redis connection manager: {e}"))
        })?;
        Ok(Self { conn_manager })
    }

    fn rate_key(key: &str) -> String {
        format!("rate:{key}")
    }

    #[allow(clippy::cast_possible_truncation)] // timestamps fit in u64 until year 2554
    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check_and_record(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let rate_key = Self::rate_key(key);
        let now_ms = Self::now_ms();
        #[allow(clippy::cast_possible_truncation)] // windows are short durations
        let window_ms = window.as_millis() as u64;
        let window_start = now_ms.saturating_sub(window_ms);

        // A failed pipeline denies the request rather than waving it past.
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .zrembyscore(&rate_key, 0, window_start as isize)
            .ignore()
            .zcard(&rate_key)
            .zadd(&rate_key, now_ms, now_ms)
            .ignore()
            .expire(&rate_key, 3600)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Error::SessionStore(format!("failed to check and record rate limit: {e}"))
            })?;

        if count >= u64::from(max_requests) {
            tracing::warn!(
                key = %key,
                attempts = count + 1,
                max_requests,
                "rate limit exceeded"
            );
            return Err(Error::RateLimited {
                retry_after: window,
            });
        }
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(Self::rate_key(key))
            .await
            .map_err(|e| Error::SessionStore(format!("failed to reset rate limit: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a running Redis instance:
    // docker run -d -p 6379:6379 redis:7-alpine

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn allows_within_limit_then_blocks() {
        let limiter = RedisRateLimiter::new("redis://127.0.0.1:6379")
            .await
            .unwrap();
        let key = format!("test:{}", uuid::Uuid::new_v4());

        for i in 1..=5 {
            let result = limiter
                .check_and_record(&key, 5, Duration::from_secs(60))
                .await;
            assert!(result.is_ok(), "attempt {i} should pass");
        }

        let result = limiter
            .check_and_record(&key, 5, Duration::from_secs(60))
            .await;
        assert!(matches!(result, Err(Error::RateLimited { .. })));

        limiter.reset(&key).await.unwrap();
        assert!(limiter
            .check_and_record(&key, 5, Duration::from_secs(60))
            .await
            .is_ok());
    }
}
