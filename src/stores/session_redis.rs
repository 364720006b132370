//! Redis-based reservation session store.
//!
//! Sessions are stored with TTL-based expiration:
//! - **Primary key**: `resv:{order_id}` → bincode-serialized session
//! - **Intent index**: `intent:{payment_intent_id}` → order id
//! - **TTL**: hold timeout + grace margin, set at construction

use crate::error::{Error, Result};
use crate::providers::SessionStore;
use crate::types::{IntentId, OrderId, ReservationSession};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use uuid::Uuid;

/// Redis session store with TTL-based expiration.
#[derive(Clone)]
pub struct RedisSessionStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn new(redis_url: &str, ttl_seconds: u64) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| Error::SessionStore(format!("failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            Error::SessionStore(format!("failed to create Redis connection manager: {e}"))
        })?;
        Ok(Self {
            conn_manager,
            ttl_seconds,
        })
    }

    fn session_key(order_id: OrderId) -> String {
        format!("resv:{order_id}")
    }

    fn intent_key(intent_id: &IntentId) -> String {
        format!("intent:{intent_id}")
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, session: &ReservationSession) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let bytes = bincode::serialize(session).map_err(|e| Error::Serialization(e.to_string()))?;
        let _: () = conn
            .set_ex(Self::session_key(session.order_id), bytes, self.ttl_seconds)
            .await
            .map_err(|e| Error::SessionStore(format!("failed to write session: {e}")))?;
        tracing::debug!(order_id = %session.order_id, ttl = self.ttl_seconds, "session written");
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<ReservationSession>> {
        let mut conn = self.conn_manager.clone();
        let bytes: Option<Vec<u8>> = conn
            .get(Self::session_key(order_id))
            .await
            .map_err(|e| Error::SessionStore(format!("failed to read session: {e}")))?;
        match bytes {
            Some(bytes) => {
                let session = bincode::deserialize(&bytes)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, order_id: OrderId) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        // Drop the intent binding along with the session when we still can.
        if let Some(session) = self.get(order_id).await? {
            let _: () = conn
                .del(Self::intent_key(&session.payment_intent_id))
                .await
                .map_err(|e| Error::SessionStore(format!("failed to delete intent key: {e}")))?;
        }
        let _: () = conn
            .del(Self::session_key(order_id))
            .await
            .map_err(|e| Error::SessionStore(format!("failed to delete session: {e}")))?;
        Ok(())
    }

    async fn bind_intent(&self, intent_id: &IntentId, order_id: OrderId) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(
                Self::intent_key(intent_id),
                order_id.as_uuid().to_string(),
                self.ttl_seconds,
            )
            .await
            .map_err(|e| Error::SessionStore(format!("failed to bind intent: {e}")))?;
        Ok(())
    }

    async fn resolve_intent(&self, intent_id: &IntentId) -> Result<Option<OrderId>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn
            .get(Self::intent_key(intent_id))
            .await
            .map_err(|e| Error::SessionStore(format!("failed to resolve intent: {e}")))?;
        match value {
            Some(raw) => {
                let uuid = Uuid::parse_str(&raw)
                    .map_err(|e| Error::Serialization(format!("bad order id in intent key: {e}")))?;
                Ok(Some(OrderId::from_uuid(uuid)))
            }
            None => Ok(None),
        }
    }
}
