//! Embedded in-process ledger engine.
//!
//! Backs the single-process deployment mode and the test suite with the
//! same semantics the core relies on from an external ledger service:
//! per-account balance limits, idempotent duplicate-id rejection, and the
//! pending/post/void hold lifecycle with timeout-based auto-release.
//!
//! Holds are expired lazily: every submission and lookup first releases
//! holds whose deadline has passed, so observers never see an overdue hold.

use super::{
    Account, AccountFlag, AccountId, AccountSnapshot, BalanceRecord, CreateAccountResult,
    CreateTransferResult, LedgerClient, Transfer, TransferFlag, TransferId, TransferSnapshot,
    TransferState,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How many balance history entries each account retains.
const HISTORY_LIMIT: usize = 1024;

struct AccountEntry {
    account: Account,
    debits_pending: u64,
    debits_posted: u64,
    credits_pending: u64,
    credits_posted: u64,
    history: Vec<BalanceRecord>,
}

impl AccountEntry {
    fn new(account: Account) -> Self {
        Self {
            account,
            debits_pending: 0,
            debits_posted: 0,
            credits_pending: 0,
            credits_posted: 0,
            history: Vec::new(),
        }
    }

    fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            id: self.account.id,
            ledger: self.account.ledger,
            code: self.account.code,
            flag: self.account.flag,
            debits_pending: self.debits_pending,
            debits_posted: self.debits_posted,
            credits_pending: self.credits_pending,
            credits_posted: self.credits_posted,
        }
    }

    fn record_history(&mut self, now: DateTime<Utc>) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.remove(0);
        }
        self.history.push(BalanceRecord {
            timestamp: now,
            debits_pending: self.debits_pending,
            debits_posted: self.debits_posted,
            credits_pending: self.credits_pending,
            credits_posted: self.credits_posted,
        });
    }
}

struct TransferEntry {
    transfer: Transfer,
    state: TransferState,
    accepted_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, AccountEntry>,
    transfers: HashMap<TransferId, TransferEntry>,
    /// Expiry index over active holds, ordered by deadline.
    pending_expiry: BTreeMap<(DateTime<Utc>, TransferId), ()>,
}

/// In-process ledger engine.
///
/// Cheap to clone through [`Arc`]; all state lives behind one mutex, which
/// matches the single-submitter discipline the batcher imposes in front of
/// it.
pub struct MemoryLedger {
    inner: Mutex<Inner>,
    offline: AtomicBool,
    create_transfer_calls: AtomicUsize,
}

impl MemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            offline: AtomicBool::new(false),
            create_transfer_calls: AtomicUsize::new(0),
        })
    }

    /// Simulate a transport outage: while offline, every call fails with a
    /// transient error and nothing is applied.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `create_transfers` round-trips served. Batching tests
    /// compare this against the number of submissions.
    #[must_use]
    pub fn create_transfer_calls(&self) -> usize {
        self.create_transfer_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::LedgerUnavailable("ledger offline".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("ledger state lock poisoned".to_string()))
    }
}

impl Inner {
    /// Release every hold whose deadline passed. Amounts return to the
    /// budget side and the hold becomes `Expired`.
    fn expire_due(&mut self, now: DateTime<Utc>) {
        loop {
            let due = match self.pending_expiry.keys().next() {
                Some(&(deadline, id)) if deadline <= now => (deadline, id),
                _ => return,
            };
            self.pending_expiry.remove(&due);
            let (_, id) = due;
            if let Some(entry) = self.transfers.get_mut(&id) {
                if entry.state == TransferState::Pending {
                    entry.state = TransferState::Expired;
                    let t = entry.transfer;
                    self.release_pending_amounts(&t, now);
                }
            }
        }
    }

    fn release_pending_amounts(&mut self, t: &Transfer, now: DateTime<Utc>) {
        if let Some(debit) = self.accounts.get_mut(&t.debit_account_id) {
            debit.debits_pending = debit.debits_pending.saturating_sub(t.amount);
            debit.record_history(now);
        }
        if let Some(credit) = self.accounts.get_mut(&t.credit_account_id) {
            credit.credits_pending = credit.credits_pending.saturating_sub(t.amount);
            credit.record_history(now);
        }
    }

    fn apply_account(&mut self, account: Account) -> CreateAccountResult {
        if account.ledger == 0 {
            return CreateAccountResult::InvalidAccount;
        }
        if self.accounts.contains_key(&account.id) {
            return CreateAccountResult::Exists;
        }
        self.accounts.insert(account.id, AccountEntry::new(account));
        CreateAccountResult::Ok
    }

    fn apply_transfer(&mut self, transfer: Transfer, now: DateTime<Utc>) -> CreateTransferResult {
        if self.transfers.contains_key(&transfer.id) {
            return CreateTransferResult::Exists;
        }
        if transfer.amount == 0 {
            return CreateTransferResult::InvalidAmount;
        }

        let result = match transfer.flag {
            TransferFlag::None | TransferFlag::Pending => self.apply_movement(&transfer, now),
            TransferFlag::PostPendingTransfer => self.apply_resolution(&transfer, now, true),
            TransferFlag::VoidPendingTransfer => self.apply_resolution(&transfer, now, false),
        };

        if result == CreateTransferResult::Ok {
            let state = if transfer.flag == TransferFlag::Pending {
                if transfer.timeout > 0 {
                    let deadline = now + chrono::Duration::seconds(i64::from(transfer.timeout));
                    self.pending_expiry.insert((deadline, transfer.id), ());
                }
                TransferState::Pending
            } else {
                TransferState::Posted
            };
            self.transfers.insert(
                transfer.id,
                TransferEntry {
                    transfer,
                    state,
                    accepted_at: now,
                },
            );
        }
        result
    }

    /// Validate and apply an immediate or pending movement.
    fn apply_movement(&mut self, t: &Transfer, now: DateTime<Utc>) -> CreateTransferResult {
        let Some(debit) = self.accounts.get(&t.debit_account_id) else {
            return CreateTransferResult::DebitAccountNotFound;
        };
        let Some(credit) = self.accounts.get(&t.credit_account_id) else {
            return CreateTransferResult::CreditAccountNotFound;
        };
        if debit.account.ledger != t.ledger || credit.account.ledger != t.ledger {
            return CreateTransferResult::LedgerMismatch;
        }
        if debit.account.flag == AccountFlag::DebitsMustNotExceedCredits
            && debit.debits_posted + debit.debits_pending + t.amount > debit.credits_posted
        {
            return CreateTransferResult::ExceedsCredits;
        }
        if credit.account.flag == AccountFlag::CreditsMustNotExceedDebits
            && credit.credits_posted + credit.credits_pending + t.amount > credit.debits_posted
        {
            return CreateTransferResult::ExceedsDebits;
        }

        let pending = t.flag == TransferFlag::Pending;
        if let Some(debit) = self.accounts.get_mut(&t.debit_account_id) {
            if pending {
                debit.debits_pending += t.amount;
            } else {
                debit.debits_posted += t.amount;
            }
            debit.record_history(now);
        }
        if let Some(credit) = self.accounts.get_mut(&t.credit_account_id) {
            if pending {
                credit.credits_pending += t.amount;
            } else {
                credit.credits_posted += t.amount;
            }
            credit.record_history(now);
        }
        CreateTransferResult::Ok
    }

    /// Resolve a hold by post (`post=true`) or void.
    fn apply_resolution(
        &mut self,
        t: &Transfer,
        now: DateTime<Utc>,
        post: bool,
    ) -> CreateTransferResult {
        let Some(pending_id) = t.pending_id else {
            return CreateTransferResult::PendingTransferNotFound;
        };
        let (pending_transfer, state) = match self.transfers.get(&pending_id) {
            Some(entry) => (entry.transfer, entry.state),
            None => return CreateTransferResult::PendingTransferNotFound,
        };
        match state {
            TransferState::Pending => {}
            TransferState::Expired => return CreateTransferResult::PendingTransferExpired,
            TransferState::PostedPending => {
                return CreateTransferResult::PendingTransferAlreadyPosted
            }
            TransferState::Voided => return CreateTransferResult::PendingTransferAlreadyVoided,
            TransferState::Posted => return CreateTransferResult::PendingTransferNotFound,
        }
        if t.amount != pending_transfer.amount {
            return CreateTransferResult::InvalidAmount;
        }

        self.release_pending_amounts(&pending_transfer, now);
        if post {
            if let Some(debit) = self.accounts.get_mut(&pending_transfer.debit_account_id) {
                debit.debits_posted += pending_transfer.amount;
                debit.record_history(now);
            }
            if let Some(credit) = self.accounts.get_mut(&pending_transfer.credit_account_id) {
                credit.credits_posted += pending_transfer.amount;
                credit.record_history(now);
            }
        }
        if let Some(entry) = self.transfers.get_mut(&pending_id) {
            entry.state = if post {
                TransferState::PostedPending
            } else {
                TransferState::Voided
            };
        }
        CreateTransferResult::Ok
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn create_accounts(&self, accounts: Vec<Account>) -> Result<Vec<CreateAccountResult>> {
        self.check_online()?;
        let mut inner = self.lock()?;
        Ok(accounts
            .into_iter()
            .map(|a| inner.apply_account(a))
            .collect())
    }

    async fn create_transfers(&self, transfers: Vec<Transfer>) -> Result<Vec<CreateTransferResult>> {
        self.check_online()?;
        self.create_transfer_calls.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let mut inner = self.lock()?;
        inner.expire_due(now);
        Ok(transfers
            .into_iter()
            .map(|t| inner.apply_transfer(t, now))
            .collect())
    }

    async fn lookup_accounts(&self, ids: Vec<AccountId>) -> Result<Vec<Option<AccountSnapshot>>> {
        self.check_online()?;
        let now = Utc::now();
        let mut inner = self.lock()?;
        inner.expire_due(now);
        Ok(ids
            .iter()
            .map(|id| inner.accounts.get(id).map(AccountEntry::snapshot))
            .collect())
    }

    async fn lookup_transfers(&self, ids: Vec<TransferId>) -> Result<Vec<Option<TransferSnapshot>>> {
        self.check_online()?;
        let now = Utc::now();
        let mut inner = self.lock()?;
        inner.expire_due(now);
        Ok(ids
            .iter()
            .map(|id| {
                inner.transfers.get(id).map(|entry| TransferSnapshot {
                    transfer: entry.transfer,
                    state: entry.state,
                    timestamp: entry.accepted_at,
                })
            })
            .collect())
    }

    async fn get_account_balances(
        &self,
        id: AccountId,
        limit: usize,
    ) -> Result<Vec<BalanceRecord>> {
        self.check_online()?;
        let now = Utc::now();
        let mut inner = self.lock()?;
        inner.expire_due(now);
        let history = inner
            .accounts
            .get(&id)
            .map(|entry| {
                let skip = entry.history.len().saturating_sub(limit);
                entry.history[skip..].to_vec()
            })
            .unwrap_or_default();
        Ok(history)
    }
}
