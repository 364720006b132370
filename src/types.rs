//! Domain types for the reservation and settlement core.
//!
//! Value objects shared across the accounting layer, the stores, and the
//! orchestrator: identifiers, ticket classes, the order state machine, and
//! the in-flight reservation session.

use crate::error::Error;
use crate::ledger::TransferId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an order (random 128-bit).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Creates a new random `OrderId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `OrderId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque payment intent identifier issued at checkout and echoed back by
/// the payment provider on callback.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(String);

impl IntentId {
    /// Wrap a provider-issued intent id.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Get the intent id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ticket classes
// ============================================================================

/// Ticket class: A (premium) or B (standard).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketClass {
    /// Premium tickets.
    A,
    /// Standard tickets.
    B,
}

impl TicketClass {
    /// Class label as stored and serialized.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }

    /// Parse a class label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTicketClass`] for anything but "A" or "B".
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            other => Err(Error::UnknownTicketClass(other.to_string())),
        }
    }

    /// Ticket price in EUR cents.
    #[must_use]
    pub const fn price_cents(&self) -> i64 {
        match self {
            Self::A => 6500,
            Self::B => 3500,
        }
    }
}

impl fmt::Display for TicketClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Currency used for all orders.
pub const CURRENCY: &str = "eur";

// ============================================================================
// Order state machine
// ============================================================================

/// Order status.
///
/// ```text
/// CREATED ──hold ok──▶ HELD ──paid──▶ PAID
///    │                  │                │ post fails
///    │ sold out         │ failed         ▼
///    ▼                  ▼          PAID_UNFULFILLED
/// FAILED             CANCELED
///                       │ hold expires
///                       ▼
///                    TIMEOUT
/// ```
///
/// Terminal statuses are never re-entered; the conditional status update on
/// the order store is the serialization point for concurrent actors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order row written, hold placed, redirect not yet issued.
    Created,
    /// Hold active, awaiting the provider webhook.
    Held,
    /// Payment settled and the ticket posted.
    Paid,
    /// Payment settled but the ticket could not be posted; refund owed.
    PaidUnfulfilled,
    /// Checkout failed (sold out).
    Failed,
    /// Provider reported payment failure; hold voided.
    Canceled,
    /// Hold expired without a webhook; swept.
    Timeout,
}

impl OrderStatus {
    /// Status label as stored in the order table.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Held => "HELD",
            Self::Paid => "PAID",
            Self::PaidUnfulfilled => "PAID_UNFULFILLED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Parse a stored status label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] for unknown labels.
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "CREATED" => Ok(Self::Created),
            "HELD" => Ok(Self::Held),
            "PAID" => Ok(Self::Paid),
            "PAID_UNFULFILLED" => Ok(Self::PaidUnfulfilled),
            "FAILED" => Ok(Self::Failed),
            "CANCELED" => Ok(Self::Canceled),
            "TIMEOUT" => Ok(Self::Timeout),
            other => Err(Error::Serialization(format!("unknown order status: {other}"))),
        }
    }

    /// Returns `true` for statuses that are never left again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Paid | Self::PaidUnfulfilled | Self::Failed | Self::Canceled | Self::Timeout
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Durable record of an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier.
    pub order_id: OrderId,
    /// Ticket class.
    pub class: TicketClass,
    /// Amount in cents.
    pub amount_cents: i64,
    /// ISO currency code (lowercase).
    pub currency: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the ledger hold expires.
    pub hold_expires_at: DateTime<Utc>,
    /// Pending transfer id for the ticket hold.
    pub ticket_pending_id: TransferId,
    /// Pending transfer id for the goodie hold; `None` if the goodie hold
    /// failed at checkout (goodies exhausted).
    pub goodie_pending_id: Option<TransferId>,
    /// Payment intent bound to this order.
    pub payment_intent_id: IntentId,
    /// Current status.
    pub status: OrderStatus,
    /// Settlement time, set on PAID / PAID_UNFULFILLED.
    pub paid_at: Option<DateTime<Utc>>,
}

/// Short-lived session for an in-flight checkout.
///
/// Carries everything settlement needs without re-reading the order row.
/// Session loss degrades to reading the order store, never to lost funds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationSession {
    /// Order this session belongs to.
    pub order_id: OrderId,
    /// Ticket class.
    pub class: TicketClass,
    /// Amount in cents.
    pub amount_cents: i64,
    /// ISO currency code (lowercase).
    pub currency: String,
    /// Pending transfer id for the ticket hold.
    pub ticket_pending_id: TransferId,
    /// Pending transfer id for the goodie hold, when one was placed.
    pub goodie_pending_id: Option<TransferId>,
    /// When the ledger hold expires.
    pub hold_expires_at: DateTime<Utc>,
    /// Payment intent bound to this order.
    pub payment_intent_id: IntentId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            OrderStatus::Created,
            OrderStatus::Held,
            OrderStatus::Paid,
            OrderStatus::PaidUnfulfilled,
            OrderStatus::Failed,
            OrderStatus::Canceled,
            OrderStatus::Timeout,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(OrderStatus::parse("REFUNDED").is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Created.is_terminal());
        assert!(!OrderStatus::Held.is_terminal());
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::PaidUnfulfilled.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Timeout.is_terminal());
    }

    #[test]
    fn class_parse() {
        assert_eq!(TicketClass::parse("A").unwrap(), TicketClass::A);
        assert_eq!(TicketClass::parse("B").unwrap(), TicketClass::B);
        assert!(TicketClass::parse("C").is_err());
    }
}
