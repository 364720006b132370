//! Reservation and settlement core for a ticketing service.
//!
//! Mediates between a double-entry ledger (scarce resources as account
//! balances), a relational order store, a short-lived session cache, and a
//! payment provider (mocked), under one consistency protocol:
//!
//! 1. Checkout atomically places a time-limited hold on one ticket and
//!    optionally one goodie, as pending ledger transfers.
//! 2. Asynchronous webhooks drive the order state machine
//!    (CREATED → HELD → PAID | FAILED | CANCELED | TIMEOUT |
//!    PAID_UNFULFILLED), surviving duplicates, reordering, and delays past
//!    the hold timeout.
//! 3. A batching front-end coalesces concurrent ledger submissions from
//!    many in-flight requests into single round-trips.
//!
//! Component map:
//! - [`ledger`] — wire model, the [`ledger::LedgerClient`] seam, the
//!   embedded engine, and the auto-batcher.
//! - [`accounting`] — domain resources as budget/spent account pairs;
//!   hold / post / void with deterministic transfer ids.
//! - [`providers`] / [`stores`] — session cache, order store, and rate
//!   limiter behind traits, with Redis / PostgreSQL / in-memory backends.
//! - [`orchestrator`] — the state machine composing all of the above.
//! - [`server`] — the axum HTTP surface.

pub mod accounting;
pub mod config;
pub mod error;
pub mod ledger;
pub mod mockpay;
pub mod orchestrator;
pub mod providers;
pub mod server;
pub mod stores;
pub mod types;
pub mod webhook;

pub use error::{Error, Result};
