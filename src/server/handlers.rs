//! Request handlers for the HTTP surface.

use super::AppState;
use crate::error::{Error, Result};
use crate::types::{IntentId, Order, OrderId};
use crate::webhook::{self, WebhookEvent, WebhookKind};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Checkout request body.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Ticket class label ("A" or "B").
    pub class: String,
}

/// Checkout response body.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Created order id.
    pub order_id: OrderId,
    /// Payment redirect URL.
    pub redirect_url: String,
    /// Amount in cents.
    pub amount_cents: i64,
    /// ISO currency code (lowercase).
    pub currency: String,
}

/// Order status response body.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    /// Order id.
    pub order_id: OrderId,
    /// Current status.
    pub status: String,
    /// Ticket class.
    pub class: String,
    /// Amount in cents.
    pub amount_cents: i64,
    /// ISO currency code (lowercase).
    pub currency: String,
    /// When the hold expires.
    pub hold_expires_at: DateTime<Utc>,
    /// Settlement time, when settled.
    pub paid_at: Option<DateTime<Utc>>,
    /// Whether a goodie is attached to this order.
    pub got_goodie: bool,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.order_id,
            status: order.status.as_str().to_string(),
            class: order.class.as_str().to_string(),
            amount_cents: order.amount_cents,
            currency: order.currency,
            hold_expires_at: order.hold_expires_at,
            paid_at: order.paid_at,
            got_goodie: order.goodie_pending_id.is_some(),
        }
    }
}

/// Webhook acknowledgment body.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Always `true` for acknowledged deliveries.
    pub ok: bool,
    /// Order status after handling.
    pub order_status: String,
    /// `true` when the delivery changed nothing.
    pub idempotent: bool,
}

/// Query parameters of the mock provider redirect.
#[derive(Debug, Deserialize)]
pub struct MockPayParams {
    /// "paid" (default) or "failed".
    pub outcome: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /checkout` — create an order, place its holds, return the payment
/// redirect.
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let class = crate::types::TicketClass::parse(&request.class)?;
    let client_key = client_key(&headers, connect_info.as_ref());
    let outcome = state.orchestrator.checkout(class, &client_key).await?;
    Ok(Json(CheckoutResponse {
        order_id: outcome.order_id,
        redirect_url: outcome.redirect_url,
        amount_cents: outcome.amount_cents,
        currency: outcome.currency,
    }))
}

/// `GET /orders/{id}` — order status, polled by the success page.
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>> {
    let order = state
        .orchestrator
        .get_order(OrderId::from_uuid(id))
        .await?
        .ok_or(Error::OrderNotFound)?;
    Ok(Json(order.into()))
}

/// `POST /payments/webhook` — provider callback. Returns 200 for every
/// delivery whose signature verifies, including duplicates.
pub async fn payments_webhook(
    State(state): State<AppState>,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<WebhookResponse>> {
    webhook::verify(&state.webhook_secret, &event, Utc::now())?;
    let intent_id = IntentId::new(event.intent_id.clone());
    let outcome = state
        .orchestrator
        .handle_webhook(&intent_id, event.event)
        .await?;
    Ok(Json(WebhookResponse {
        ok: true,
        order_status: outcome.status.as_str().to_string(),
        idempotent: outcome.idempotent,
    }))
}

/// `GET /payments/mock/{intent_id}` — mock provider redirect target. Emits
/// the signed webhook the way the real provider would, then sends the
/// customer on.
pub async fn mockpay_redirect(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
    Query(params): Query<MockPayParams>,
) -> Result<Response> {
    let intent_id = IntentId::new(intent_id);
    let order_id = state.orchestrator.resolve_intent(&intent_id).await?;

    let kind = match params.outcome.as_deref() {
        None | Some("paid") => WebhookKind::Paid,
        _ => WebhookKind::Failed,
    };
    state.mockpay.emit_webhook(&intent_id, kind).await?;

    let location = match kind {
        WebhookKind::Paid => format!("/success?order_id={order_id}"),
        WebhookKind::Failed => "/cancel".to_string(),
    };
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// `GET /inventory` — per-class availability from the ledger.
pub async fn get_inventory(State(state): State<AppState>) -> Result<Response> {
    let inventory = state.accounting.inventory().await?;
    Ok(Json(inventory).into_response())
}

/// `GET /health` — liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Rate-limit key for a request: leftmost `X-Forwarded-For` hop when
/// present (reverse-proxy deployments), otherwise the peer address.
fn client_key(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_key_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.1.2.3, 10.0.0.1".parse().unwrap());
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let info = ConnectInfo(addr);
        assert_eq!(client_key(&headers, Some(&info)), "10.1.2.3");
        assert_eq!(client_key(&HeaderMap::new(), Some(&info)), "127.0.0.1");
        assert_eq!(client_key(&HeaderMap::new(), None), "unknown");
    }
}
