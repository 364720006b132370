//! In-memory rate limiter.
//!
//! Sliding window over per-key timestamp vectors; the whole check-and-record
//! runs under one lock.

use crate::error::{Error, Result};
use crate::providers::RateLimiter;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// In-memory sliding-window rate limiter.
#[derive(Default)]
pub struct MemoryRateLimiter {
    windows: Mutex<HashMap<String, Vec<Instant>>>,
}

impl MemoryRateLimiter {
    /// Create an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check_and_record(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<()> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| Error::Internal("rate limiter lock poisoned".to_string()))?;
        let now = Instant::now();
        let attempts = windows.entry(key.to_string()).or_default();
        attempts.retain(|t| now.duration_since(*t) < window);
        if attempts.len() >= max_requests as usize {
            return Err(Error::RateLimited {
                retry_after: window,
            });
        }
        attempts.push(now);
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| Error::Internal("rate limiter lock poisoned".to_string()))?;
        windows.remove(key);
        Ok(())
    }
}
