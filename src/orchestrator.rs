//! Checkout / webhook orchestrator.
//!
//! Drives an order through its state machine:
//!
//! ```text
//! CREATED ──hold ok──▶ HELD ──paid──▶ PAID | PAID_UNFULFILLED
//!    │ sold out          │ failed ──▶ CANCELED
//!    ▼                   │ hold expired ──▶ TIMEOUT
//! FAILED
//! ```
//!
//! Webhooks may be duplicated, reordered, delayed past the hold timeout,
//! or lost. Two mechanisms absorb all of it: transfer ids are deterministic
//! per `(order_id, kind)` so ledger effects collapse, and the conditional
//! status update on the order store lets exactly one actor move an order
//! out of HELD.

use crate::accounting::ResourceAccounting;
use crate::error::{Error, Result};
use crate::mockpay::MockPay;
use crate::providers::{OrderStore, RateLimiter, SessionStore};
use crate::types::{
    IntentId, Order, OrderId, OrderStatus, ReservationSession, TicketClass, CURRENCY,
};
use crate::webhook::WebhookKind;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hold timeout in seconds; also the ledger pending-transfer timeout.
    pub hold_timeout_seconds: u32,
    /// Grace between `hold_expires_at` and sweep eligibility.
    pub sweep_grace_seconds: u32,
    /// Checkout rate limit: requests per window per client key.
    pub rate_limit_requests: u32,
    /// Checkout rate limit window.
    pub rate_limit_window: std::time::Duration,
}

/// Result of a successful checkout.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    /// The created order.
    pub order_id: OrderId,
    /// URL the customer is redirected to for payment.
    pub redirect_url: String,
    /// Amount in cents.
    pub amount_cents: i64,
    /// ISO currency code (lowercase).
    pub currency: String,
}

/// Result of handling a webhook delivery.
#[derive(Debug, Clone, Copy)]
pub struct WebhookOutcome {
    /// Order the webhook settled (or found already settled).
    pub order_id: OrderId,
    /// Order status after handling.
    pub status: OrderStatus,
    /// `true` when this delivery changed nothing: the order was already
    /// terminal or another actor won the transition.
    pub idempotent: bool,
}

/// Checkout / webhook orchestrator (component E).
pub struct Orchestrator {
    accounting: Arc<ResourceAccounting>,
    sessions: Arc<dyn SessionStore>,
    orders: Arc<dyn OrderStore>,
    limiter: Arc<dyn RateLimiter>,
    mockpay: Arc<MockPay>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create the orchestrator.
    #[must_use]
    pub fn new(
        accounting: Arc<ResourceAccounting>,
        sessions: Arc<dyn SessionStore>,
        orders: Arc<dyn OrderStore>,
        limiter: Arc<dyn RateLimiter>,
        mockpay: Arc<MockPay>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            accounting,
            sessions,
            orders,
            limiter,
            mockpay,
            config,
        }
    }

    /// Create an order and place its holds.
    ///
    /// Rate limited per `client_key` (the client IP). On sold-out the order
    /// row is persisted as FAILED and [`Error::SoldOut`] is returned; the
    /// goodie never blocks a checkout.
    ///
    /// # Errors
    ///
    /// [`Error::RateLimited`], [`Error::SoldOut`], or a transient store /
    /// ledger error.
    pub async fn checkout(&self, class: TicketClass, client_key: &str) -> Result<CheckoutOutcome> {
        self.limiter
            .check_and_record(
                &format!("checkout:{client_key}"),
                self.config.rate_limit_requests,
                self.config.rate_limit_window,
            )
            .await?;

        let order_id = OrderId::new();
        let intent_id = self.mockpay.create_intent();
        let now = Utc::now();

        let hold = self
            .accounting
            .hold(order_id, class, true, self.config.hold_timeout_seconds)
            .await?;

        if !hold.ticket_ok {
            let order = Order {
                order_id,
                class,
                amount_cents: class.price_cents(),
                currency: CURRENCY.to_string(),
                created_at: now,
                hold_expires_at: now,
                ticket_pending_id: hold.ticket_pending_id,
                goodie_pending_id: None,
                payment_intent_id: intent_id,
                status: OrderStatus::Failed,
                paid_at: None,
            };
            self.orders.insert(&order).await?;
            tracing::info!(order_id = %order_id, class = %class, "checkout rejected, sold out");
            return Err(Error::SoldOut);
        }

        let hold_expires_at =
            now + Duration::seconds(i64::from(self.config.hold_timeout_seconds));
        let order = Order {
            order_id,
            class,
            amount_cents: class.price_cents(),
            currency: CURRENCY.to_string(),
            created_at: now,
            hold_expires_at,
            ticket_pending_id: hold.ticket_pending_id,
            goodie_pending_id: hold.goodie_pending_id,
            payment_intent_id: intent_id.clone(),
            status: OrderStatus::Created,
            paid_at: None,
        };
        self.orders.insert(&order).await?;

        let session = ReservationSession {
            order_id,
            class,
            amount_cents: order.amount_cents,
            currency: order.currency.clone(),
            ticket_pending_id: hold.ticket_pending_id,
            goodie_pending_id: hold.goodie_pending_id,
            hold_expires_at,
            payment_intent_id: intent_id.clone(),
            created_at: now,
        };
        self.sessions.put(&session).await?;
        self.sessions.bind_intent(&intent_id, order_id).await?;

        let moved = self
            .orders
            .update_status(order_id, &[OrderStatus::Created], OrderStatus::Held, None)
            .await?;
        if !moved {
            tracing::warn!(order_id = %order_id, "fresh order already left CREATED");
        }

        tracing::info!(
            order_id = %order_id,
            class = %class,
            goodie = hold.goodie_ok,
            intent_id = %intent_id,
            "checkout held"
        );
        Ok(CheckoutOutcome {
            order_id,
            redirect_url: self.mockpay.redirect_url(&intent_id),
            amount_cents: order.amount_cents,
            currency: order.currency,
        })
    }

    /// Settle an order from a verified webhook delivery.
    ///
    /// Idempotent: terminal orders short-circuit, duplicate deliveries lose
    /// the conditional update, and replayed ledger operations collapse on
    /// their deterministic ids.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownIntent`] / [`Error::OrderNotFound`] for unmatched
    /// deliveries, or a transient store / ledger error (the provider
    /// retries those).
    pub async fn handle_webhook(
        &self,
        intent_id: &IntentId,
        kind: WebhookKind,
    ) -> Result<WebhookOutcome> {
        // Session first, order store as fallback; session loss must not
        // strand deliveries.
        let order_id = match self.sessions.resolve_intent(intent_id).await? {
            Some(order_id) => order_id,
            None => self
                .orders
                .get_by_intent(intent_id)
                .await?
                .map(|o| o.order_id)
                .ok_or(Error::UnknownIntent)?,
        };
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(Error::OrderNotFound)?;

        if order.status.is_terminal() {
            tracing::debug!(order_id = %order_id, status = %order.status, "webhook on settled order");
            return Ok(WebhookOutcome {
                order_id,
                status: order.status,
                idempotent: true,
            });
        }

        match kind {
            WebhookKind::Paid => self.settle_paid(&order).await,
            WebhookKind::Failed => self.settle_failed(&order).await,
        }
    }

    async fn settle_paid(&self, order: &Order) -> Result<WebhookOutcome> {
        let posted = self
            .accounting
            .post(
                order.order_id,
                order.class,
                order.ticket_pending_id,
                order.goodie_pending_id,
            )
            .await?;
        let target = if posted.ticket_posted {
            OrderStatus::Paid
        } else {
            OrderStatus::PaidUnfulfilled
        };

        let won = self
            .orders
            .update_status(order.order_id, &[OrderStatus::Held], target, Some(Utc::now()))
            .await?;
        if !won {
            return self.lost_transition(order.order_id, target).await;
        }

        if target == OrderStatus::PaidUnfulfilled {
            // Refund handling lives outside the core; flag it loudly.
            tracing::warn!(
                order_id = %order.order_id,
                amount_cents = order.amount_cents,
                currency = %order.currency,
                "paid but unfulfilled, refund required"
            );
        } else {
            tracing::info!(order_id = %order.order_id, goodie = posted.goodie_posted, "order paid");
        }
        self.drop_session(order.order_id).await;
        Ok(WebhookOutcome {
            order_id: order.order_id,
            status: target,
            idempotent: false,
        })
    }

    async fn settle_failed(&self, order: &Order) -> Result<WebhookOutcome> {
        self.accounting
            .void(
                order.order_id,
                order.class,
                order.ticket_pending_id,
                order.goodie_pending_id,
            )
            .await?;

        let won = self
            .orders
            .update_status(
                order.order_id,
                &[OrderStatus::Held],
                OrderStatus::Canceled,
                None,
            )
            .await?;
        if !won {
            return self.lost_transition(order.order_id, OrderStatus::Canceled).await;
        }

        tracing::info!(order_id = %order.order_id, "order canceled, hold released");
        self.drop_session(order.order_id).await;
        Ok(WebhookOutcome {
            order_id: order.order_id,
            status: OrderStatus::Canceled,
            idempotent: false,
        })
    }

    /// Another actor moved the order first; report its outcome.
    async fn lost_transition(
        &self,
        order_id: OrderId,
        fallback: OrderStatus,
    ) -> Result<WebhookOutcome> {
        let status = self
            .orders
            .get(order_id)
            .await?
            .map_or(fallback, |o| o.status);
        Ok(WebhookOutcome {
            order_id,
            status,
            idempotent: true,
        })
    }

    /// Session cleanup is best effort; expiry handles the rest.
    async fn drop_session(&self, order_id: OrderId) {
        if let Err(e) = self.sessions.delete(order_id).await {
            tracing::warn!(order_id = %order_id, error = %e, "failed to drop session");
        }
    }

    /// One sweep pass: void and time out orders whose hold expired more
    /// than the grace period ago. Returns how many orders were moved.
    ///
    /// The ledger already auto-released the budget when the holds expired;
    /// the void is a no-op there and the conditional update keeps the sweep
    /// from racing a late webhook.
    ///
    /// # Errors
    ///
    /// Returns a transient store / ledger error; the next pass retries.
    pub async fn sweep_once(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::seconds(i64::from(self.config.sweep_grace_seconds));
        let expired = self.orders.list_expired_held(cutoff, 256).await?;
        let mut moved = 0;
        for order in expired {
            self.accounting
                .void(
                    order.order_id,
                    order.class,
                    order.ticket_pending_id,
                    order.goodie_pending_id,
                )
                .await?;
            let won = self
                .orders
                .update_status(
                    order.order_id,
                    &[OrderStatus::Held],
                    OrderStatus::Timeout,
                    None,
                )
                .await?;
            if won {
                moved += 1;
                tracing::info!(order_id = %order.order_id, "order timed out, hold released");
                self.drop_session(order.order_id).await;
            }
        }
        Ok(moved)
    }

    /// Run the sweep forever at the given cadence. Spawned as a background
    /// task at startup.
    pub async fn run_sweeper(self: Arc<Self>, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(moved) => tracing::info!(moved, "timeout sweep finished"),
                Err(e) => tracing::warn!(error = %e, "timeout sweep failed"),
            }
        }
    }

    /// Fetch an order for the status endpoint.
    ///
    /// # Errors
    ///
    /// Returns a transient store error.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.orders.get(order_id).await
    }

    /// Resolve a payment intent for the mock provider redirect.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownIntent`] when nothing matches.
    pub async fn resolve_intent(&self, intent_id: &IntentId) -> Result<OrderId> {
        match self.sessions.resolve_intent(intent_id).await? {
            Some(order_id) => Ok(order_id),
            None => self
                .orders
                .get_by_intent(intent_id)
                .await?
                .map(|o| o.order_id)
                .ok_or(Error::UnknownIntent),
        }
    }
}
