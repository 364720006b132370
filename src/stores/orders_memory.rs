//! In-memory order store.
//!
//! Single-process mode and tests. The conditional status update runs under
//! one lock, giving the same at-most-one-winner guarantee as the SQL
//! `UPDATE … WHERE status = ANY(…)`.

use crate::error::{Error, Result};
use crate::providers::OrderStore;
use crate::types::{IntentId, Order, OrderId, OrderStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    by_intent: HashMap<String, OrderId>,
}

/// In-memory order store.
#[derive(Default)]
pub struct MemoryOrderStore {
    inner: Mutex<Inner>,
}

impl MemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Database("order store lock poisoned".to_string()))
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.orders.contains_key(&order.order_id)
            || inner
                .by_intent
                .contains_key(order.payment_intent_id.as_str())
        {
            return Err(Error::Database(
                "duplicate order or payment intent".to_string(),
            ));
        }
        inner
            .by_intent
            .insert(order.payment_intent_id.as_str().to_string(), order.order_id);
        inner.orders.insert(order.order_id, order.clone());
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let inner = self.lock()?;
        Ok(inner.orders.get(&order_id).cloned())
    }

    async fn get_by_intent(&self, intent_id: &IntentId) -> Result<Option<Order>> {
        let inner = self.lock()?;
        Ok(inner
            .by_intent
            .get(intent_id.as_str())
            .and_then(|id| inner.orders.get(id))
            .cloned())
    }

    async fn update_status(
        &self,
        order_id: OrderId,
        from: &[OrderStatus],
        to: OrderStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        let Some(order) = inner.orders.get_mut(&order_id) else {
            return Ok(false);
        };
        if !from.contains(&order.status) {
            return Ok(false);
        }
        order.status = to;
        if paid_at.is_some() {
            order.paid_at = paid_at;
        }
        Ok(true)
    }

    async fn list_expired_held(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Order>> {
        let inner = self.lock()?;
        let mut expired: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Held && o.hold_expires_at < cutoff)
            .cloned()
            .collect();
        expired.sort_by_key(|o| o.hold_expires_at);
        expired.truncate(limit);
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TicketClass;
    use chrono::Duration;
    use std::sync::Arc;

    fn sample_order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            order_id: OrderId::new(),
            class: TicketClass::A,
            amount_cents: 6500,
            currency: "eur".to_string(),
            created_at: now,
            hold_expires_at: now + Duration::seconds(300),
            ticket_pending_id: 1,
            goodie_pending_id: None,
            payment_intent_id: IntentId::new(format!("mock_{}", uuid::Uuid::new_v4().simple())),
            status,
            paid_at: None,
        }
    }

    #[tokio::test]
    async fn duplicate_intent_rejected() {
        let store = MemoryOrderStore::new();
        let order = sample_order(OrderStatus::Held);
        store.insert(&order).await.unwrap();

        let mut dup = sample_order(OrderStatus::Held);
        dup.payment_intent_id = order.payment_intent_id.clone();
        assert!(store.insert(&dup).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_transition_has_one_winner() {
        let store = Arc::new(MemoryOrderStore::new());
        let order = sample_order(OrderStatus::Held);
        store.insert(&order).await.unwrap();

        let a = {
            let store = Arc::clone(&store);
            let id = order.order_id;
            tokio::spawn(async move {
                store
                    .update_status(id, &[OrderStatus::Held], OrderStatus::Paid, Some(Utc::now()))
                    .await
                    .unwrap()
            })
        };
        let b = {
            let store = Arc::clone(&store);
            let id = order.order_id;
            tokio::spawn(async move {
                store
                    .update_status(id, &[OrderStatus::Held], OrderStatus::Canceled, None)
                    .await
                    .unwrap()
            })
        };

        let (won_a, won_b) = (a.await.unwrap(), b.await.unwrap());
        assert!(won_a ^ won_b, "exactly one transition must win");

        let status = store.get(order.order_id).await.unwrap().unwrap().status;
        assert!(status.is_terminal());
    }

    #[tokio::test]
    async fn expired_listing_filters_and_orders() {
        let store = MemoryOrderStore::new();

        let mut old = sample_order(OrderStatus::Held);
        old.hold_expires_at = Utc::now() - Duration::seconds(120);
        let mut older = sample_order(OrderStatus::Held);
        older.hold_expires_at = Utc::now() - Duration::seconds(240);
        let fresh = sample_order(OrderStatus::Held);
        let paid = {
            let mut o = sample_order(OrderStatus::Paid);
            o.hold_expires_at = Utc::now() - Duration::seconds(240);
            o
        };
        for order in [&old, &older, &fresh, &paid] {
            store.insert(order).await.unwrap();
        }

        let expired = store
            .list_expired_held(Utc::now() - Duration::seconds(60), 10)
            .await
            .unwrap();
        assert_eq!(expired.len(), 2);
        assert_eq!(expired[0].order_id, older.order_id);
        assert_eq!(expired[1].order_id, old.order_id);
    }
}
