//! Configuration management for the reservation core.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Leaving `DATABASE_URL` / `SESSION_STORE_URL` unset selects the in-memory
//! stores for the single-process mode.

use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Order / session store configuration.
    pub stores: StoreConfig,
    /// Ledger and batcher configuration.
    pub ledger: LedgerConfig,
    /// Checkout, supply, and sweep configuration.
    pub checkout: CheckoutConfig,
    /// Webhook signing configuration.
    pub webhook: WebhookConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL connection URL for the order store; in-memory when unset.
    pub database_url: Option<String>,
    /// Redis connection URL for the session store and rate limiter;
    /// in-memory when unset.
    pub session_store_url: Option<String>,
}

/// Ledger and batcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Address of an external ledger service. The embedded engine is used
    /// when unset; a remote `LedgerClient` slots in behind the same batcher.
    pub address: Option<String>,
    /// Maximum transfers per ledger submission.
    pub max_batch: usize,
    /// How long the batch worker waits for more items after the first, in
    /// microseconds.
    pub max_wait_micros: u64,
    /// Bound of the per-operation submission queue.
    pub queue_depth: usize,
}

/// Checkout, supply, and sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Hold timeout in seconds (ledger pending-transfer timeout).
    pub hold_timeout_seconds: u64,
    /// Grace between `hold_expires_at` and sweep eligibility, in seconds.
    pub sweep_grace_seconds: u64,
    /// Sweep cadence in seconds.
    pub sweep_interval_seconds: u64,
    /// Total class A ticket supply.
    pub ticket_supply_a: u64,
    /// Total class B ticket supply.
    pub ticket_supply_b: u64,
    /// Total goodie supply.
    pub goodie_supply: u64,
    /// Checkout rate limit: requests per window per client IP.
    pub rate_limit_requests: u32,
    /// Checkout rate limit window in seconds.
    pub rate_limit_window_seconds: u64,
}

/// Webhook signing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret for webhook HMAC signatures.
    pub secret: String,
    /// URL the mock provider delivers webhooks to.
    pub mock_webhook_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
            },
            stores: StoreConfig {
                database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
                session_store_url: env::var("SESSION_STORE_URL").ok().filter(|s| !s.is_empty()),
            },
            ledger: LedgerConfig {
                address: env::var("TB_ADDRESS").ok().filter(|s| !s.is_empty()),
                max_batch: env::var("LEDGER_MAX_BATCH")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8189),
                max_wait_micros: env::var("LEDGER_MAX_WAIT_MICROS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(200),
                queue_depth: env::var("LEDGER_QUEUE_DEPTH")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1024),
            },
            checkout: CheckoutConfig {
                hold_timeout_seconds: env::var("HOLD_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
                sweep_grace_seconds: env::var("SWEEP_GRACE_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
                sweep_interval_seconds: env::var("SWEEP_INTERVAL_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
                ticket_supply_a: env::var("TICKET_SUPPLY_A")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
                ticket_supply_b: env::var("TICKET_SUPPLY_B")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
                goodie_supply: env::var("GOODIE_SUPPLY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
                rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(20),
                rate_limit_window_seconds: env::var("RATE_LIMIT_WINDOW")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            },
            webhook: WebhookConfig {
                secret: env::var("WEBHOOK_SECRET")
                    .unwrap_or_else(|_| "dev-secret-change-me".to_string()),
                mock_webhook_url: env::var("MOCK_WEBHOOK_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/payments/webhook".to_string()),
            },
        }
    }

    /// Session TTL in seconds: hold timeout plus a grace margin so sessions
    /// outlive the hold they describe.
    #[must_use]
    pub const fn session_ttl_seconds(&self) -> u64 {
        self.checkout.hold_timeout_seconds + 60
    }
}
