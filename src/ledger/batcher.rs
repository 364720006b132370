//! Auto-batching front-end over a [`LedgerClient`].
//!
//! Coalesces concurrent submissions from many request handlers into a small
//! number of large ledger round-trips. One worker task per operation kind
//! owns a bounded FIFO of submissions; each submission carries the caller's
//! items and a one-shot reply slot. The worker drains up to `max_batch`
//! items, or until `max_wait` has elapsed since the first item, submits the
//! combined batch, and fans the positional results back out.
//!
//! A transport failure fails every submission in the batch with a transient
//! error. The batcher never retries: the ledger may have received the batch,
//! and retrying non-idempotent work here would double-apply it. Callers
//! retry at the orchestrator level, where transfer ids are deterministic.

use super::{
    Account, AccountId, AccountSnapshot, BalanceRecord, CreateAccountResult, CreateTransferResult,
    LedgerClient, Transfer, TransferId, TransferSnapshot,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Batcher tuning.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Maximum items per ledger submission. Must stay at or below the
    /// ledger's per-message limit (8189 transfers, 8190 accounts).
    pub max_batch: usize,
    /// How long the worker keeps draining after the first item arrives.
    pub max_wait: Duration,
    /// Bound of the per-operation submission queue.
    pub queue_depth: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch: 8189,
            max_wait: Duration::from_micros(200),
            queue_depth: 1024,
        }
    }
}

struct Submission<T, R> {
    items: Vec<T>,
    reply: oneshot::Sender<Result<Vec<R>>>,
}

type SubmitFn<T, R> =
    Box<dyn Fn(Vec<T>) -> Pin<Box<dyn Future<Output = Result<Vec<R>>> + Send>> + Send + Sync>;

/// Auto-batching ledger front-end.
///
/// Implements [`LedgerClient`] itself, so the accounting layer talks to the
/// batcher exactly as it would to the underlying client.
pub struct LedgerBatcher {
    inner: Arc<dyn LedgerClient>,
    max_batch: usize,
    transfers: mpsc::Sender<Submission<Transfer, CreateTransferResult>>,
    accounts: mpsc::Sender<Submission<Account, CreateAccountResult>>,
    account_lookups: mpsc::Sender<Submission<AccountId, Option<AccountSnapshot>>>,
    transfer_lookups: mpsc::Sender<Submission<TransferId, Option<TransferSnapshot>>>,
}

impl LedgerBatcher {
    /// Spawn the worker tasks and return the shared front-end.
    pub fn spawn(inner: Arc<dyn LedgerClient>, config: BatcherConfig) -> Arc<Self> {
        let (transfers_tx, transfers_rx) = mpsc::channel(config.queue_depth);
        let (accounts_tx, accounts_rx) = mpsc::channel(config.queue_depth);
        let (account_lookups_tx, account_lookups_rx) = mpsc::channel(config.queue_depth);
        let (transfer_lookups_tx, transfer_lookups_rx) = mpsc::channel(config.queue_depth);

        {
            let client = Arc::clone(&inner);
            let submit: SubmitFn<Transfer, CreateTransferResult> = Box::new(move |batch| {
                let client = Arc::clone(&client);
                Box::pin(async move { client.create_transfers(batch).await })
            });
            tokio::spawn(run_worker(transfers_rx, config.clone(), submit, "transfers"));
        }
        {
            let client = Arc::clone(&inner);
            let submit: SubmitFn<Account, CreateAccountResult> = Box::new(move |batch| {
                let client = Arc::clone(&client);
                Box::pin(async move { client.create_accounts(batch).await })
            });
            tokio::spawn(run_worker(accounts_rx, config.clone(), submit, "accounts"));
        }
        {
            let client = Arc::clone(&inner);
            let submit: SubmitFn<AccountId, Option<AccountSnapshot>> = Box::new(move |batch| {
                let client = Arc::clone(&client);
                Box::pin(async move { client.lookup_accounts(batch).await })
            });
            tokio::spawn(run_worker(
                account_lookups_rx,
                config.clone(),
                submit,
                "account_lookups",
            ));
        }
        {
            let client = Arc::clone(&inner);
            let submit: SubmitFn<TransferId, Option<TransferSnapshot>> = Box::new(move |batch| {
                let client = Arc::clone(&client);
                Box::pin(async move { client.lookup_transfers(batch).await })
            });
            tokio::spawn(run_worker(
                transfer_lookups_rx,
                config.clone(),
                submit,
                "transfer_lookups",
            ));
        }

        Arc::new(Self {
            inner,
            max_batch: config.max_batch,
            transfers: transfers_tx,
            accounts: accounts_tx,
            account_lookups: account_lookups_tx,
            transfer_lookups: transfer_lookups_tx,
        })
    }

    async fn enqueue<T, R>(
        &self,
        queue: &mpsc::Sender<Submission<T, R>>,
        items: Vec<T>,
    ) -> Result<Vec<R>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        if items.len() > self.max_batch {
            return Err(Error::Internal(format!(
                "submission of {} items exceeds batch limit {}",
                items.len(),
                self.max_batch
            )));
        }
        let (reply, rx) = oneshot::channel();
        queue
            .send(Submission { items, reply })
            .await
            .map_err(|_| Error::LedgerUnavailable("batch worker stopped".to_string()))?;
        rx.await
            .map_err(|_| Error::LedgerUnavailable("batch worker dropped reply".to_string()))?
    }
}

#[async_trait]
impl LedgerClient for LedgerBatcher {
    async fn create_accounts(&self, accounts: Vec<Account>) -> Result<Vec<CreateAccountResult>> {
        self.enqueue(&self.accounts, accounts).await
    }

    async fn create_transfers(&self, transfers: Vec<Transfer>) -> Result<Vec<CreateTransferResult>> {
        self.enqueue(&self.transfers, transfers).await
    }

    async fn lookup_accounts(&self, ids: Vec<AccountId>) -> Result<Vec<Option<AccountSnapshot>>> {
        self.enqueue(&self.account_lookups, ids).await
    }

    async fn lookup_transfers(&self, ids: Vec<TransferId>) -> Result<Vec<Option<TransferSnapshot>>> {
        self.enqueue(&self.transfer_lookups, ids).await
    }

    async fn get_account_balances(
        &self,
        id: AccountId,
        limit: usize,
    ) -> Result<Vec<BalanceRecord>> {
        // Single-account history query; nothing to coalesce.
        self.inner.get_account_balances(id, limit).await
    }
}

/// Worker loop for one operation kind.
///
/// A submission that would push the batch past `max_batch` is carried over
/// as the first submission of the next batch, so batches never exceed the
/// ledger's wire limit.
async fn run_worker<T, R>(
    mut rx: mpsc::Receiver<Submission<T, R>>,
    config: BatcherConfig,
    submit: SubmitFn<T, R>,
    kind: &'static str,
) where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    let mut carry: Option<Submission<T, R>> = None;
    loop {
        let first = match carry.take() {
            Some(submission) => submission,
            None => match rx.recv().await {
                Some(submission) => submission,
                None => return,
            },
        };

        let deadline = Instant::now() + config.max_wait;
        let mut total = first.items.len();
        let mut submissions = vec![first];

        while total < config.max_batch {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(submission)) => {
                    if total + submission.items.len() > config.max_batch {
                        carry = Some(submission);
                        break;
                    }
                    total += submission.items.len();
                    submissions.push(submission);
                }
                // Queue closed or wait window elapsed.
                Ok(None) | Err(_) => break,
            }
        }

        let batch: Vec<T> = submissions
            .iter()
            .flat_map(|s| s.items.iter().cloned())
            .collect();
        tracing::trace!(
            kind,
            submissions = submissions.len(),
            items = batch.len(),
            "submitting ledger batch"
        );

        match submit(batch).await {
            Ok(results) => {
                let mut offset = 0;
                for submission in submissions {
                    let n = submission.items.len();
                    let reply = results
                        .get(offset..offset + n)
                        .map(<[R]>::to_vec)
                        .ok_or_else(|| {
                            Error::LedgerUnavailable("short result batch from ledger".to_string())
                        });
                    offset += n;
                    // Caller may have gone away; nothing to do then.
                    let _ = submission.reply.send(reply);
                }
            }
            Err(e) => {
                tracing::warn!(kind, error = %e, "ledger batch failed, failing all callers");
                for submission in submissions {
                    let _ = submission.reply.send(Err(e.clone()));
                }
            }
        }
    }
}
