//! In-memory reservation session store.
//!
//! Single-process mode and tests. Entries carry their own deadline and are
//! filtered on read, mirroring the Redis TTL behavior.

use crate::error::{Error, Result};
use crate::providers::SessionStore;
use crate::types::{IntentId, OrderId, ReservationSession};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

struct Entry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<OrderId, Entry<ReservationSession>>,
    intents: HashMap<String, Entry<OrderId>>,
}

/// In-memory session store with TTL semantics.
pub struct MemorySessionStore {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl MemorySessionStore {
    /// Create a store whose entries live for `ttl_seconds`.
    #[must_use]
    pub fn new(ttl_seconds: u64) -> Self {
        #[allow(clippy::cast_possible_wrap)]
        let ttl = Duration::seconds(ttl_seconds as i64);
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::SessionStore("session store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session: &ReservationSession) -> Result<()> {
        let mut inner = self.lock()?;
        inner.sessions.insert(
            session.order_id,
            Entry {
                value: session.clone(),
                expires_at: Utc::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<ReservationSession>> {
        let inner = self.lock()?;
        Ok(inner
            .sessions
            .get(&order_id)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, order_id: OrderId) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(entry) = inner.sessions.remove(&order_id) {
            inner
                .intents
                .remove(entry.value.payment_intent_id.as_str());
        }
        Ok(())
    }

    async fn bind_intent(&self, intent_id: &IntentId, order_id: OrderId) -> Result<()> {
        let mut inner = self.lock()?;
        inner.intents.insert(
            intent_id.as_str().to_string(),
            Entry {
                value: order_id,
                expires_at: Utc::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn resolve_intent(&self, intent_id: &IntentId) -> Result<Option<OrderId>> {
        let inner = self.lock()?;
        Ok(inner
            .intents
            .get(intent_id.as_str())
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.value))
    }
}
