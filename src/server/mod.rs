//! HTTP surface.
//!
//! Builds the axum router over the orchestrator and maps the error taxonomy
//! onto status codes: 409 sold out, 429 rate limited, 401 bad signature,
//! 404 unknown ids, 503 for transient store and ledger faults.

pub mod handlers;

use crate::accounting::ResourceAccounting;
use crate::error::Error;
use crate::mockpay::MockPay;
use crate::orchestrator::Orchestrator;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Checkout / webhook orchestrator.
    pub orchestrator: Arc<Orchestrator>,
    /// Accounting layer, for inventory queries.
    pub accounting: Arc<ResourceAccounting>,
    /// Mock payment provider.
    pub mockpay: Arc<MockPay>,
    /// Webhook signing secret.
    pub webhook_secret: String,
}

/// Build the complete axum router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/checkout", post(handlers::create_checkout))
        .route("/orders/:id", get(handlers::get_order))
        .route("/payments/webhook", post(handlers::payments_webhook))
        .route("/payments/mock/:intent_id", get(handlers::mockpay_redirect))
        .route("/inventory", get(handlers::get_inventory))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Stable error code for client handling.
    code: &'static str,
    /// Human-readable message.
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Error::SoldOut => (StatusCode::CONFLICT, "SOLD_OUT"),
            Error::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Error::UnknownTicketClass(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Error::InvalidSignature => (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE"),
            Error::UnknownIntent => (StatusCode::NOT_FOUND, "UNKNOWN_INTENT"),
            Error::OrderNotFound => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
            Error::LedgerUnavailable(_) | Error::Database(_) | Error::SessionStore(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
            }
            Error::Serialization(_) | Error::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        }

        // Internal detail stays in the logs.
        let message = if status.is_server_error() {
            "service temporarily unavailable".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { code, message })).into_response()
    }
}
