//! Ledger wire model and client seam.
//!
//! The ledger is a fixed universe of double-entry accounts identified by a
//! numeric `ledger` tag and a 128-bit id. All scarce resources are pairs of
//! budget/spent accounts; bookings are unit transfers between them, with
//! pending transfers expressing time-limited holds.
//!
//! [`LedgerClient`] is the seam every deployment goes through: the embedded
//! engine in [`memory`] backs the single-process mode and tests, and the
//! auto-batching front-end in [`batcher`] wraps any client to coalesce
//! concurrent submissions.

pub mod batcher;
pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 128-bit account identifier.
pub type AccountId = u128;

/// 128-bit transfer identifier.
pub type TransferId = u128;

// ============================================================================
// Accounts
// ============================================================================

/// Balance-limit flag set at account creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountFlag {
    /// No balance limit.
    #[default]
    None,
    /// Debits (posted + pending) may never exceed posted credits. Set on
    /// budget accounts so bookings cannot outrun supply.
    DebitsMustNotExceedCredits,
    /// Credits (posted + pending) may never exceed posted debits.
    CreditsMustNotExceedDebits,
}

/// Account creation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account id, unique across the cluster.
    pub id: AccountId,
    /// Ledger tag; transfers never cross ledgers.
    pub ledger: u32,
    /// Domain code.
    pub code: u16,
    /// Balance-limit flag.
    pub flag: AccountFlag,
}

impl Account {
    /// Account with no balance limit.
    #[must_use]
    pub const fn new(id: AccountId, ledger: u32, code: u16) -> Self {
        Self {
            id,
            ledger,
            code,
            flag: AccountFlag::None,
        }
    }

    /// Budget account: debits capped by posted credits.
    #[must_use]
    pub const fn budget(id: AccountId, ledger: u32, code: u16) -> Self {
        Self {
            id,
            ledger,
            code,
            flag: AccountFlag::DebitsMustNotExceedCredits,
        }
    }
}

/// Point-in-time view of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Account id.
    pub id: AccountId,
    /// Ledger tag.
    pub ledger: u32,
    /// Domain code.
    pub code: u16,
    /// Balance-limit flag.
    pub flag: AccountFlag,
    /// Sum of pending debits.
    pub debits_pending: u64,
    /// Sum of posted debits.
    pub debits_posted: u64,
    /// Sum of pending credits.
    pub credits_pending: u64,
    /// Sum of posted credits.
    pub credits_posted: u64,
}

/// One entry of an account's balance history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    /// When the balances changed.
    pub timestamp: DateTime<Utc>,
    /// Sum of pending debits after the change.
    pub debits_pending: u64,
    /// Sum of posted debits after the change.
    pub debits_posted: u64,
    /// Sum of pending credits after the change.
    pub credits_pending: u64,
    /// Sum of posted credits after the change.
    pub credits_posted: u64,
}

// ============================================================================
// Transfers
// ============================================================================

/// Transfer flag. At most one applies per transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferFlag {
    /// Immediate transfer, posted on acceptance.
    #[default]
    None,
    /// Creates a hold that expires after `timeout` seconds unless resolved.
    Pending,
    /// Resolves the hold named by `pending_id` into a committed transfer.
    PostPendingTransfer,
    /// Cancels the hold named by `pending_id`, releasing its units.
    VoidPendingTransfer,
}

/// Transfer submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Transfer id; the ledger rejects duplicates idempotently.
    pub id: TransferId,
    /// Debited account.
    pub debit_account_id: AccountId,
    /// Credited account.
    pub credit_account_id: AccountId,
    /// Units moved.
    pub amount: u64,
    /// Ledger tag; must match both accounts.
    pub ledger: u32,
    /// Domain code.
    pub code: u16,
    /// Transfer flag.
    pub flag: TransferFlag,
    /// Hold expiry in seconds; pending transfers only, 0 means no expiry.
    pub timeout: u32,
    /// Hold being resolved; post/void transfers only.
    pub pending_id: Option<TransferId>,
}

impl Transfer {
    /// Immediate transfer.
    #[must_use]
    pub const fn immediate(
        id: TransferId,
        debit_account_id: AccountId,
        credit_account_id: AccountId,
        amount: u64,
        ledger: u32,
        code: u16,
    ) -> Self {
        Self {
            id,
            debit_account_id,
            credit_account_id,
            amount,
            ledger,
            code,
            flag: TransferFlag::None,
            timeout: 0,
            pending_id: None,
        }
    }

    /// Pending transfer (hold) expiring after `timeout` seconds.
    #[must_use]
    pub const fn pending(
        id: TransferId,
        debit_account_id: AccountId,
        credit_account_id: AccountId,
        amount: u64,
        ledger: u32,
        code: u16,
        timeout: u32,
    ) -> Self {
        Self {
            id,
            debit_account_id,
            credit_account_id,
            amount,
            ledger,
            code,
            flag: TransferFlag::Pending,
            timeout,
            pending_id: None,
        }
    }

    /// Post resolution of the hold `pending_id`.
    #[must_use]
    pub const fn post(
        id: TransferId,
        debit_account_id: AccountId,
        credit_account_id: AccountId,
        amount: u64,
        ledger: u32,
        code: u16,
        pending_id: TransferId,
    ) -> Self {
        Self {
            id,
            debit_account_id,
            credit_account_id,
            amount,
            ledger,
            code,
            flag: TransferFlag::PostPendingTransfer,
            timeout: 0,
            pending_id: Some(pending_id),
        }
    }

    /// Void resolution of the hold `pending_id`.
    #[must_use]
    pub const fn void(
        id: TransferId,
        debit_account_id: AccountId,
        credit_account_id: AccountId,
        amount: u64,
        ledger: u32,
        code: u16,
        pending_id: TransferId,
    ) -> Self {
        Self {
            id,
            debit_account_id,
            credit_account_id,
            amount,
            ledger,
            code,
            flag: TransferFlag::VoidPendingTransfer,
            timeout: 0,
            pending_id: Some(pending_id),
        }
    }
}

/// Lifecycle state of an accepted transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    /// Committed.
    Posted,
    /// Active hold.
    Pending,
    /// Hold resolved by a post.
    PostedPending,
    /// Hold resolved by a void.
    Voided,
    /// Hold auto-released on expiry.
    Expired,
}

/// Point-in-time view of an accepted transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSnapshot {
    /// The transfer as accepted.
    pub transfer: Transfer,
    /// Current lifecycle state.
    pub state: TransferState,
    /// When the transfer was accepted.
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Per-item result codes
// ============================================================================

/// Per-item result of an account creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateAccountResult {
    /// Account created.
    Ok,
    /// An account with this id already exists; creation collapses
    /// idempotently.
    Exists,
    /// Ledger or code is invalid.
    InvalidAccount,
}

impl CreateAccountResult {
    /// Returns `true` when the account exists after the call, whether this
    /// call created it or a previous one did.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Ok | Self::Exists)
    }
}

/// Per-item result of a transfer creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateTransferResult {
    /// Transfer accepted.
    Ok,
    /// A transfer with this id was already accepted; duplicates collapse
    /// idempotently.
    Exists,
    /// Debit account does not exist.
    DebitAccountNotFound,
    /// Credit account does not exist.
    CreditAccountNotFound,
    /// Transfer and account ledger tags disagree.
    LedgerMismatch,
    /// Amount is zero or disagrees with the pending transfer being resolved.
    InvalidAmount,
    /// Accepting the transfer would push the debit account past its
    /// `DebitsMustNotExceedCredits` limit (budget exhausted).
    ExceedsCredits,
    /// Accepting the transfer would push the credit account past its
    /// `CreditsMustNotExceedDebits` limit.
    ExceedsDebits,
    /// No pending transfer with the given `pending_id` exists.
    PendingTransferNotFound,
    /// The hold expired before it could be resolved.
    PendingTransferExpired,
    /// The hold was already resolved by a post.
    PendingTransferAlreadyPosted,
    /// The hold was already resolved by a void.
    PendingTransferAlreadyVoided,
}

impl CreateTransferResult {
    /// Returns `true` when the transfer is in effect after the call: either
    /// accepted now or previously accepted under the same id.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Ok | Self::Exists)
    }
}

// ============================================================================
// Client seam
// ============================================================================

/// Opaque client of the ledger service.
///
/// All methods are batch-shaped: results are positional with the request
/// items. A transport failure fails the whole call; per-item rejections are
/// result codes, not errors.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Create accounts; one result per item.
    async fn create_accounts(&self, accounts: Vec<Account>) -> Result<Vec<CreateAccountResult>>;

    /// Create transfers; one result per item.
    async fn create_transfers(&self, transfers: Vec<Transfer>) -> Result<Vec<CreateTransferResult>>;

    /// Look up accounts by id; `None` for absent ids.
    async fn lookup_accounts(&self, ids: Vec<AccountId>) -> Result<Vec<Option<AccountSnapshot>>>;

    /// Look up transfers by id; `None` for absent ids.
    async fn lookup_transfers(&self, ids: Vec<TransferId>) -> Result<Vec<Option<TransferSnapshot>>>;

    /// Balance history for one account, most recent last, at most `limit`
    /// entries.
    async fn get_account_balances(
        &self,
        id: AccountId,
        limit: usize,
    ) -> Result<Vec<BalanceRecord>>;
}
