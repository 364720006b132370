//! Reservation session store trait.

use crate::error::Result;
use crate::types::{IntentId, OrderId, ReservationSession};
use async_trait::async_trait;

/// Short-lived session store for in-flight checkouts (component C).
///
/// Keyed by order id, with a secondary `payment_intent_id → order_id`
/// binding for webhook correlation. Writes are last-writer-wins; there are
/// no multi-key transactions. Entries expire with a TTL of at least the
/// hold timeout plus a grace margin. Session loss degrades to reading the
/// order store, never to lost funds.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write the session under its order id.
    async fn put(&self, session: &ReservationSession) -> Result<()>;

    /// Read a session; `None` when absent or expired.
    async fn get(&self, order_id: OrderId) -> Result<Option<ReservationSession>>;

    /// Delete a session and its intent binding. Absent sessions are fine.
    async fn delete(&self, order_id: OrderId) -> Result<()>;

    /// Bind a payment intent to an order id.
    async fn bind_intent(&self, intent_id: &IntentId, order_id: OrderId) -> Result<()>;

    /// Resolve a payment intent to its order id; `None` when unknown or
    /// expired.
    async fn resolve_intent(&self, intent_id: &IntentId) -> Result<Option<OrderId>>;
}
