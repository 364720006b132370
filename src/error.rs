//! Error types for the reservation and settlement core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for checkout, settlement, and the stores they compose.
///
/// Variants are grouped by where they surface: user-visible checkout
/// outcomes, webhook rejections, and infrastructure faults.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════
    // Checkout
    // ═══════════════════════════════════════════════════════════
    /// The ticket budget for the requested class is exhausted.
    #[error("sold out")]
    SoldOut,

    /// Caller exceeded the checkout rate limit.
    #[error("too many requests, retry after {retry_after:?}")]
    RateLimited {
        /// Duration to wait before retrying.
        retry_after: std::time::Duration,
    },

    /// The requested ticket class does not exist.
    #[error("unknown ticket class: {0}")]
    UnknownTicketClass(String),

    // ═══════════════════════════════════════════════════════════
    // Webhook
    // ═══════════════════════════════════════════════════════════
    /// Webhook signature did not verify (or the timestamp is outside
    /// the accepted skew window).
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// No order is associated with the payment intent.
    #[error("unknown payment intent")]
    UnknownIntent,

    /// Order id does not exist.
    #[error("order not found")]
    OrderNotFound,

    // ═══════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════
    /// Ledger submission failed in transport; the whole batch is failed
    /// and callers retry at the orchestrator level.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Order store failure.
    #[error("database error: {0}")]
    Database(String),

    /// Session store failure.
    #[error("session store error: {0}")]
    SessionStore(String),

    /// Encoding or decoding of a stored value failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unexpected internal fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns `true` if the operation may succeed on retry.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LedgerUnavailable(_) | Self::Database(_) | Self::SessionStore(_)
        )
    }

    /// Returns `true` if this error is caused by client input rather
    /// than a fault in the core.
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::SoldOut
                | Self::RateLimited { .. }
                | Self::UnknownTicketClass(_)
                | Self::InvalidSignature
                | Self::UnknownIntent
                | Self::OrderNotFound
        )
    }
}
