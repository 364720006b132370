//! Resource accounting over the ledger.
//!
//! Maps the domain (ticket classes, the goodie pool, the restart counter)
//! onto budget/spent account pairs and expresses hold, post, and void as
//! transfer primitives. Every transfer id is a deterministic function of
//! `(order_id, kind)`, so replays submit identical ids and the ledger
//! collapses duplicates.

use crate::error::{Error, Result};
use crate::ledger::{
    Account, AccountId, AccountSnapshot, CreateTransferResult, LedgerClient, Transfer, TransferId,
};
use crate::types::{OrderId, TicketClass};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// Topology
// ============================================================================

/// Ledger tag for stats counters.
pub const STATS_LEDGER: u32 = 1000;
/// Ledger tag for ticket resources.
pub const TICKETS_LEDGER: u32 = 2000;

const CODE_FUNDING: u16 = 1;
const CODE_STATS: u16 = 10;
const CODE_TICKETS: u16 = 20;

/// Restart counter spent account.
pub const RESTART_SPENT: AccountId = 1000;
/// Restart counter budget account.
pub const RESTART_BUDGET: AccountId = 1005;
const RESTART_OPERATOR: AccountId = 1001;

/// Goodie pool spent account.
pub const GOODIE_SPENT: AccountId = 2110;
/// Goodie pool budget account.
pub const GOODIE_BUDGET: AccountId = 2115;
const GOODIE_OPERATOR: AccountId = 2101;

/// Class A ticket spent account.
pub const CLASS_A_SPENT: AccountId = 2120;
/// Class A ticket budget account.
pub const CLASS_A_BUDGET: AccountId = 2125;
const CLASS_A_OPERATOR: AccountId = 2102;

/// Class B ticket spent account.
pub const CLASS_B_SPENT: AccountId = 2220;
/// Class B ticket budget account.
pub const CLASS_B_BUDGET: AccountId = 2225;
const CLASS_B_OPERATOR: AccountId = 2103;

const RESTART_SUPPLY: u64 = 1_000_000;

/// Budget and spent accounts for a ticket class.
#[must_use]
pub const fn ticket_accounts(class: TicketClass) -> (AccountId, AccountId) {
    match class {
        TicketClass::A => (CLASS_A_BUDGET, CLASS_A_SPENT),
        TicketClass::B => (CLASS_B_BUDGET, CLASS_B_SPENT),
    }
}

// ============================================================================
// Deterministic transfer ids
// ============================================================================

/// Kind of a derived transfer within an order's lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    /// Pending hold on the ticket.
    TicketHold,
    /// Pending hold on the goodie.
    GoodieHold,
    /// Post resolution of the ticket hold (also reused for the immediate
    /// retry after expiry).
    TicketPost,
    /// Post resolution of the goodie hold (also reused for the immediate
    /// retry after expiry).
    GoodiePost,
    /// Void resolution of the ticket hold.
    TicketVoid,
    /// Void resolution of the goodie hold.
    GoodieVoid,
}

impl TransferKind {
    const fn tag(self) -> &'static str {
        match self {
            Self::TicketHold => "ticket-hold",
            Self::GoodieHold => "goodie-hold",
            Self::TicketPost => "ticket-post",
            Self::GoodiePost => "goodie-post",
            Self::TicketVoid => "ticket-void",
            Self::GoodieVoid => "goodie-void",
        }
    }
}

/// Derive the transfer id for `(order_id, kind)`: the first 16 bytes of
/// SHA-256 over the order id and the kind tag.
#[must_use]
pub fn derive_transfer_id(order_id: OrderId, kind: TransferKind) -> TransferId {
    let mut hasher = Sha256::new();
    hasher.update(order_id.as_uuid().as_bytes());
    hasher.update(kind.tag().as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .take(16)
        .fold(0u128, |acc, byte| (acc << 8) | u128::from(*byte))
}

/// Deterministic id for a supply funding transfer, so re-running
/// `initialize_supply` on restart collapses at the ledger.
fn funding_transfer_id(resource: &str) -> TransferId {
    let mut hasher = Sha256::new();
    hasher.update(b"funding:");
    hasher.update(resource.as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .take(16)
        .fold(0u128, |acc, byte| (acc << 8) | u128::from(*byte))
}

// ============================================================================
// Accounting layer
// ============================================================================

/// Configured resource supplies.
#[derive(Debug, Clone, Copy)]
pub struct SupplyConfig {
    /// Total class A tickets.
    pub class_a: u64,
    /// Total class B tickets.
    pub class_b: u64,
    /// Total goodies.
    pub goodies: u64,
}

/// Result of a hold attempt.
#[derive(Debug, Clone, Copy)]
pub struct HoldOutcome {
    /// Ticket hold placed (or already in effect under the same id).
    /// `false` means sold out.
    pub ticket_ok: bool,
    /// Goodie hold placed. `false` is not an error: goodies are exhausted
    /// and the order proceeds without one.
    pub goodie_ok: bool,
    /// Derived pending id of the ticket hold.
    pub ticket_pending_id: TransferId,
    /// Derived pending id of the goodie hold, when one is in effect.
    pub goodie_pending_id: Option<TransferId>,
}

/// Result of a post attempt.
#[derive(Debug, Clone, Copy)]
pub struct PostOutcome {
    /// Ticket committed, either by resolving the hold or by the immediate
    /// retry after expiry. `false` means the order is paid but unfulfilled.
    pub ticket_posted: bool,
    /// Goodie committed.
    pub goodie_posted: bool,
}

/// Per-class availability derived from ledger snapshots.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClassInventory {
    /// Configured capacity.
    pub capacity: u64,
    /// Tickets sold (posted).
    pub sold: u64,
    /// Tickets under an active hold.
    pub active_holds: u64,
    /// Remaining sellable tickets.
    pub available: i64,
    /// Whether another checkout would be rejected.
    pub sold_out: bool,
}

/// Accounting layer over a [`LedgerClient`] (normally the batcher).
pub struct ResourceAccounting {
    ledger: Arc<dyn LedgerClient>,
    supply: SupplyConfig,
}

impl ResourceAccounting {
    /// Create the accounting layer.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>, supply: SupplyConfig) -> Self {
        Self { ledger, supply }
    }

    /// Idempotently create the fixed account set and fund each budget
    /// account from its operator account. Safe to run on every process
    /// start: duplicate accounts and funding transfers collapse at the
    /// ledger.
    ///
    /// Supplies are funded once per ledger lifetime; changing a supply
    /// requires a fresh ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger is unreachable or rejects the
    /// topology.
    pub async fn initialize_supply(&self) -> Result<()> {
        let accounts = vec![
            Account::new(RESTART_OPERATOR, STATS_LEDGER, CODE_STATS),
            Account::new(RESTART_SPENT, STATS_LEDGER, CODE_STATS),
            Account::budget(RESTART_BUDGET, STATS_LEDGER, CODE_STATS),
            Account::new(GOODIE_OPERATOR, TICKETS_LEDGER, CODE_TICKETS),
            Account::new(GOODIE_SPENT, TICKETS_LEDGER, CODE_TICKETS),
            Account::budget(GOODIE_BUDGET, TICKETS_LEDGER, CODE_TICKETS),
            Account::new(CLASS_A_OPERATOR, TICKETS_LEDGER, CODE_TICKETS),
            Account::new(CLASS_A_SPENT, TICKETS_LEDGER, CODE_TICKETS),
            Account::budget(CLASS_A_BUDGET, TICKETS_LEDGER, CODE_TICKETS),
            Account::new(CLASS_B_OPERATOR, TICKETS_LEDGER, CODE_TICKETS),
            Account::new(CLASS_B_SPENT, TICKETS_LEDGER, CODE_TICKETS),
            Account::budget(CLASS_B_BUDGET, TICKETS_LEDGER, CODE_TICKETS),
        ];
        let results = self.ledger.create_accounts(accounts).await?;
        if let Some(rejected) = results.iter().find(|r| !r.is_applied()) {
            return Err(Error::Internal(format!(
                "ledger rejected account creation: {rejected:?}"
            )));
        }

        let fundings = vec![
            Transfer::immediate(
                funding_transfer_id("restart-counter"),
                RESTART_OPERATOR,
                RESTART_BUDGET,
                RESTART_SUPPLY,
                STATS_LEDGER,
                CODE_FUNDING,
            ),
            Transfer::immediate(
                funding_transfer_id("goodies"),
                GOODIE_OPERATOR,
                GOODIE_BUDGET,
                self.supply.goodies,
                TICKETS_LEDGER,
                CODE_FUNDING,
            ),
            Transfer::immediate(
                funding_transfer_id("class-a-tickets"),
                CLASS_A_OPERATOR,
                CLASS_A_BUDGET,
                self.supply.class_a,
                TICKETS_LEDGER,
                CODE_FUNDING,
            ),
            Transfer::immediate(
                funding_transfer_id("class-b-tickets"),
                CLASS_B_OPERATOR,
                CLASS_B_BUDGET,
                self.supply.class_b,
                TICKETS_LEDGER,
                CODE_FUNDING,
            ),
        ];
        // A zero supply funds nothing; the budget simply stays empty.
        let fundings: Vec<Transfer> = fundings.into_iter().filter(|t| t.amount > 0).collect();
        let results = self.ledger.create_transfers(fundings).await?;
        if let Some(rejected) = results.iter().find(|r| !r.is_applied()) {
            return Err(Error::Internal(format!(
                "ledger rejected supply funding: {rejected:?}"
            )));
        }

        tracing::info!(
            class_a = self.supply.class_a,
            class_b = self.supply.class_b,
            goodies = self.supply.goodies,
            "ledger topology initialized"
        );
        Ok(())
    }

    /// Book one unit on the restart counter. Called once per process start.
    ///
    /// # Errors
    ///
    /// Returns an error only on transport failure; an exhausted counter is
    /// logged and ignored.
    pub async fn record_restart(&self) -> Result<()> {
        let transfer = Transfer::immediate(
            rand::random::<u128>(),
            RESTART_BUDGET,
            RESTART_SPENT,
            1,
            STATS_LEDGER,
            CODE_STATS,
        );
        let results = self.ledger.create_transfers(vec![transfer]).await?;
        match results.first() {
            Some(r) if r.is_applied() => Ok(()),
            other => {
                tracing::warn!(result = ?other, "restart counter transfer rejected");
                Ok(())
            }
        }
    }

    /// Place a time-limited hold on one ticket and, when `want_goodie`, one
    /// goodie.
    ///
    /// `ticket_ok=false` means sold out; a goodie hold that slipped through
    /// anyway is voided before returning. `goodie_ok=false` just means the
    /// goodie pool is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure; callers retry with the same
    /// `order_id` and get the same transfer ids.
    pub async fn hold(
        &self,
        order_id: OrderId,
        class: TicketClass,
        want_goodie: bool,
        timeout_seconds: u32,
    ) -> Result<HoldOutcome> {
        let (budget, spent) = ticket_accounts(class);
        let ticket_pending_id = derive_transfer_id(order_id, TransferKind::TicketHold);
        let goodie_pending_id = derive_transfer_id(order_id, TransferKind::GoodieHold);

        let mut transfers = vec![Transfer::pending(
            ticket_pending_id,
            budget,
            spent,
            1,
            TICKETS_LEDGER,
            CODE_TICKETS,
            timeout_seconds,
        )];
        if want_goodie {
            transfers.push(Transfer::pending(
                goodie_pending_id,
                GOODIE_BUDGET,
                GOODIE_SPENT,
                1,
                TICKETS_LEDGER,
                CODE_TICKETS,
                timeout_seconds,
            ));
        }

        let results = self.ledger.create_transfers(transfers).await?;
        let ticket_ok = results.first().is_some_and(CreateTransferResult::is_applied);
        let goodie_ok =
            want_goodie && results.get(1).is_some_and(CreateTransferResult::is_applied);

        if !ticket_ok && goodie_ok {
            // Sold out but the goodie hold landed; release it rather than
            // letting it sit until the timeout.
            self.void_goodie(order_id, goodie_pending_id).await?;
        }

        tracing::debug!(
            order_id = %order_id,
            class = %class,
            ticket_ok,
            goodie_ok,
            "hold placed"
        );
        Ok(HoldOutcome {
            ticket_ok,
            goodie_ok,
            ticket_pending_id,
            goodie_pending_id: (ticket_ok && goodie_ok).then_some(goodie_pending_id),
        })
    }

    /// Resolve the order's holds into committed transfers.
    ///
    /// A hold the ledger reports as expired is retried as an immediate
    /// transfer under the same derived id; if that still fails the ticket
    /// is unfulfilled and the caller marks the order accordingly.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn post(
        &self,
        order_id: OrderId,
        class: TicketClass,
        ticket_pending_id: TransferId,
        goodie_pending_id: Option<TransferId>,
    ) -> Result<PostOutcome> {
        let (budget, spent) = ticket_accounts(class);
        let ticket_post_id = derive_transfer_id(order_id, TransferKind::TicketPost);
        let goodie_post_id = derive_transfer_id(order_id, TransferKind::GoodiePost);

        let mut transfers = vec![Transfer::post(
            ticket_post_id,
            budget,
            spent,
            1,
            TICKETS_LEDGER,
            CODE_TICKETS,
            ticket_pending_id,
        )];
        if let Some(goodie_pending) = goodie_pending_id {
            transfers.push(Transfer::post(
                goodie_post_id,
                GOODIE_BUDGET,
                GOODIE_SPENT,
                1,
                TICKETS_LEDGER,
                CODE_TICKETS,
                goodie_pending,
            ));
        }

        let results = self.ledger.create_transfers(transfers).await?;
        let ticket_result = results.first().copied();
        let goodie_result = goodie_pending_id.and(results.get(1).copied());

        // Expired holds fall back to an immediate booking with the same
        // derived id, so webhook retries stay idempotent.
        let mut retries = Vec::new();
        let mut ticket_retry_index = None;
        let mut goodie_retry_index = None;
        if ticket_result == Some(CreateTransferResult::PendingTransferExpired) {
            ticket_retry_index = Some(retries.len());
            retries.push(Transfer::immediate(
                ticket_post_id,
                budget,
                spent,
                1,
                TICKETS_LEDGER,
                CODE_TICKETS,
            ));
        }
        if goodie_result == Some(CreateTransferResult::PendingTransferExpired) {
            goodie_retry_index = Some(retries.len());
            retries.push(Transfer::immediate(
                goodie_post_id,
                GOODIE_BUDGET,
                GOODIE_SPENT,
                1,
                TICKETS_LEDGER,
                CODE_TICKETS,
            ));
        }

        let retry_results = if retries.is_empty() {
            Vec::new()
        } else {
            tracing::info!(order_id = %order_id, "expired hold on post, retrying immediately");
            self.ledger.create_transfers(retries).await?
        };

        let ticket_posted = match ticket_retry_index {
            Some(i) => retry_results
                .get(i)
                .is_some_and(CreateTransferResult::is_applied),
            None => ticket_result.is_some_and(|r| r.is_applied()),
        };
        let goodie_posted = match goodie_retry_index {
            Some(i) => retry_results
                .get(i)
                .is_some_and(CreateTransferResult::is_applied),
            None => goodie_result.is_some_and(|r| r.is_applied()),
        };

        if !ticket_posted {
            tracing::warn!(order_id = %order_id, result = ?ticket_result, "ticket post failed");
        }
        Ok(PostOutcome {
            ticket_posted,
            goodie_posted,
        })
    }

    /// Void the order's holds, releasing the units back to budget.
    /// Already-expired and already-voided holds count as success.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn void(
        &self,
        order_id: OrderId,
        class: TicketClass,
        ticket_pending_id: TransferId,
        goodie_pending_id: Option<TransferId>,
    ) -> Result<()> {
        let (budget, spent) = ticket_accounts(class);
        let mut transfers = vec![Transfer::void(
            derive_transfer_id(order_id, TransferKind::TicketVoid),
            budget,
            spent,
            1,
            TICKETS_LEDGER,
            CODE_TICKETS,
            ticket_pending_id,
        )];
        if let Some(goodie_pending) = goodie_pending_id {
            transfers.push(Transfer::void(
                derive_transfer_id(order_id, TransferKind::GoodieVoid),
                GOODIE_BUDGET,
                GOODIE_SPENT,
                1,
                TICKETS_LEDGER,
                CODE_TICKETS,
                goodie_pending,
            ));
        }

        let results = self.ledger.create_transfers(transfers).await?;
        for result in results {
            if !void_settled(result) {
                tracing::warn!(order_id = %order_id, result = ?result, "void rejected");
            }
        }
        Ok(())
    }

    /// Void only the goodie hold (used when the ticket hold failed at
    /// checkout but the goodie hold landed).
    async fn void_goodie(&self, order_id: OrderId, goodie_pending_id: TransferId) -> Result<()> {
        let transfers = vec![Transfer::void(
            derive_transfer_id(order_id, TransferKind::GoodieVoid),
            GOODIE_BUDGET,
            GOODIE_SPENT,
            1,
            TICKETS_LEDGER,
            CODE_TICKETS,
            goodie_pending_id,
        )];
        let results = self.ledger.create_transfers(transfers).await?;
        for result in results {
            if !void_settled(result) {
                tracing::warn!(order_id = %order_id, result = ?result, "goodie void rejected");
            }
        }
        Ok(())
    }

    /// Per-class availability computed from the spent accounts.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn inventory(&self) -> Result<BTreeMap<String, ClassInventory>> {
        let snapshots = self
            .ledger
            .lookup_accounts(vec![CLASS_A_SPENT, CLASS_B_SPENT])
            .await?;
        let mut out = BTreeMap::new();
        let capacities = [self.supply.class_a, self.supply.class_b];
        for ((class, snapshot), capacity) in [TicketClass::A, TicketClass::B]
            .iter()
            .zip(snapshots)
            .zip(capacities)
        {
            let snapshot = snapshot.ok_or_else(|| {
                Error::Internal(format!("spent account missing for class {class}"))
            })?;
            out.insert(class.as_str().to_string(), class_inventory(capacity, &snapshot));
        }
        Ok(out)
    }

    /// Number of goodies committed so far.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn goodies_used(&self) -> Result<u64> {
        let snapshots = self.ledger.lookup_accounts(vec![GOODIE_SPENT]).await?;
        let snapshot = snapshots
            .first()
            .copied()
            .flatten()
            .ok_or_else(|| Error::Internal("goodie spent account missing".to_string()))?;
        Ok(snapshot.credits_posted)
    }
}

/// Whether a void result leaves the hold released.
const fn void_settled(result: CreateTransferResult) -> bool {
    matches!(
        result,
        CreateTransferResult::Ok
            | CreateTransferResult::Exists
            | CreateTransferResult::PendingTransferExpired
            | CreateTransferResult::PendingTransferAlreadyVoided
    )
}

fn class_inventory(capacity: u64, snapshot: &AccountSnapshot) -> ClassInventory {
    let sold = snapshot.credits_posted;
    let active_holds = snapshot.credits_pending;
    #[allow(clippy::cast_possible_wrap)]
    let available = capacity as i64 - sold as i64 - active_holds as i64;
    ClassInventory {
        capacity,
        sold,
        active_holds,
        available,
        sold_out: available <= 0,
    }
}
