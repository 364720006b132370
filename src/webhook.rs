//! Webhook payload and signature verification.
//!
//! The provider signs the canonical form `intent_id + "|" + event + "|" +
//! timestamp` with HMAC-SHA256 under a shared secret, base64url-encoded.
//! Verification accepts a ±5 minute timestamp skew and compares in constant
//! time.

use crate::error::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Accepted |now − timestamp| skew in seconds.
pub const MAX_SKEW_SECONDS: i64 = 300;

/// Webhook outcome reported by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookKind {
    /// Payment settled.
    #[serde(rename = "payment.paid")]
    Paid,
    /// Payment failed or was abandoned.
    #[serde(rename = "payment.failed")]
    Failed,
}

impl WebhookKind {
    /// Event label as it appears on the wire and in the canonical form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "payment.paid",
            Self::Failed => "payment.failed",
        }
    }
}

/// Webhook payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event kind.
    pub event: WebhookKind,
    /// Payment intent the event refers to.
    pub intent_id: String,
    /// Unix timestamp (seconds) the provider stamped the event with.
    pub timestamp: i64,
    /// base64url HMAC-SHA256 over the canonical form.
    pub signature: String,
}

fn canonical(intent_id: &str, event: WebhookKind, timestamp: i64) -> String {
    format!("{intent_id}|{}|{timestamp}", event.as_str())
}

fn mac(secret: &str, message: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("webhook secret rejected: {e}")))?;
    mac.update(message.as_bytes());
    Ok(mac)
}

/// Sign the canonical form of an event.
///
/// # Errors
///
/// Returns an error only if the secret is unusable as an HMAC key.
pub fn sign(secret: &str, intent_id: &str, event: WebhookKind, timestamp: i64) -> Result<String> {
    let mac = mac(secret, &canonical(intent_id, event, timestamp))?;
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Verify an event's signature and timestamp skew.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] when the signature does not verify
/// or the timestamp is outside the skew window.
pub fn verify(secret: &str, event: &WebhookEvent, now: DateTime<Utc>) -> Result<()> {
    if (now.timestamp() - event.timestamp).abs() > MAX_SKEW_SECONDS {
        return Err(Error::InvalidSignature);
    }
    let provided = URL_SAFE_NO_PAD
        .decode(event.signature.as_bytes())
        .map_err(|_| Error::InvalidSignature)?;
    let mac = mac(secret, &canonical(&event.intent_id, event.event, event.timestamp))?;
    mac.verify_slice(&provided)
        .map_err(|_| Error::InvalidSignature)
}
