//! Mock payment provider adapter.
//!
//! Stands in for the real provider at its interface: mints payment intents,
//! produces the redirect URL the checkout response carries, and delivers
//! signed webhooks over HTTP the way the provider would. The redirect
//! target itself lives in the HTTP layer; this adapter only emits.

use crate::error::{Error, Result};
use crate::types::IntentId;
use crate::webhook::{self, WebhookEvent, WebhookKind};
use chrono::Utc;
use uuid::Uuid;

/// Mock payment provider.
pub struct MockPay {
    secret: String,
    webhook_url: String,
    http: reqwest::Client,
}

impl MockPay {
    /// Create the adapter.
    #[must_use]
    pub fn new(secret: String, webhook_url: String) -> Self {
        Self {
            secret,
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    /// Mint a fresh payment intent id.
    #[must_use]
    pub fn create_intent(&self) -> IntentId {
        IntentId::new(format!("mock_{}", Uuid::new_v4().simple()))
    }

    /// Redirect URL the checkout response sends the customer to.
    #[must_use]
    pub fn redirect_url(&self, intent_id: &IntentId) -> String {
        format!("/payments/mock/{intent_id}")
    }

    /// Sign and deliver a webhook for `intent_id`.
    ///
    /// Delivery failure is logged, not raised: the customer redirect must
    /// not fail because the callback endpoint was briefly unreachable, and
    /// the hold either times out or is settled by a retried delivery.
    ///
    /// # Errors
    ///
    /// Returns an error only if the event cannot be signed.
    pub async fn emit_webhook(&self, intent_id: &IntentId, kind: WebhookKind) -> Result<()> {
        let timestamp = Utc::now().timestamp();
        let signature = webhook::sign(&self.secret, intent_id.as_str(), kind, timestamp)?;
        let event = WebhookEvent {
            event: kind,
            intent_id: intent_id.as_str().to_string(),
            timestamp,
            signature,
        };

        match self.http.post(&self.webhook_url).json(&event).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(intent_id = %intent_id, kind = kind.as_str(), "webhook delivered");
            }
            Ok(response) => {
                tracing::warn!(
                    intent_id = %intent_id,
                    status = %response.status(),
                    "webhook rejected by receiver"
                );
            }
            Err(e) => {
                tracing::warn!(intent_id = %intent_id, error = %e, "webhook delivery failed");
            }
        }
        Ok(())
    }

    /// Build a signed event without delivering it (used by tests and by
    /// in-process delivery).
    ///
    /// # Errors
    ///
    /// Returns an error only if the event cannot be signed.
    pub fn signed_event(&self, intent_id: &IntentId, kind: WebhookKind) -> Result<WebhookEvent> {
        let timestamp = Utc::now().timestamp();
        Ok(WebhookEvent {
            event: kind,
            intent_id: intent_id.as_str().to_string(),
            timestamp,
            signature: webhook::sign(&self.secret, intent_id.as_str(), kind, timestamp)?,
        })
    }
}

impl std::fmt::Debug for MockPay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPay")
            .field("webhook_url", &self.webhook_url)
            .finish_non_exhaustive()
    }
}
