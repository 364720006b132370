//! Order store trait.

use crate::error::Result;
use crate::types::{IntentId, Order, OrderId, OrderStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable order store (component D).
///
/// `update_status` is the serialization point of the whole system: it is a
/// conditional update that only succeeds while the current status is in
/// `from`, so at most one actor moves an order out of HELD. Losing the race
/// is not an error; callers reload and treat the delivery as idempotent.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order. The payment intent id is unique across orders.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Fetch an order by id.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Fetch an order by payment intent.
    async fn get_by_intent(&self, intent_id: &IntentId) -> Result<Option<Order>>;

    /// Conditionally transition `order_id` to `to` while its status is in
    /// `from`. Sets `paid_at` when given. Returns `true` when this call won
    /// the transition, `false` when another actor already moved the order.
    async fn update_status(
        &self,
        order_id: OrderId,
        from: &[OrderStatus],
        to: OrderStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Orders still HELD whose hold expired before `cutoff`, oldest first.
    async fn list_expired_held(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Order>>;
}
