//! Shared test stack: embedded ledger behind the batcher, in-memory stores,
//! and an orchestrator wired like the single-process deployment.

use boxoffice::accounting::{ResourceAccounting, SupplyConfig};
use boxoffice::ledger::batcher::{BatcherConfig, LedgerBatcher};
use boxoffice::ledger::memory::MemoryLedger;
use boxoffice::ledger::{AccountSnapshot, LedgerClient};
use boxoffice::mockpay::MockPay;
use boxoffice::orchestrator::{Orchestrator, OrchestratorConfig};
use boxoffice::providers::OrderStore;
use boxoffice::stores::{MemoryOrderStore, MemoryRateLimiter, MemorySessionStore};
use boxoffice::types::{IntentId, Order, OrderId};
use std::sync::Arc;
use std::time::Duration;

pub struct TestStack {
    pub ledger: Arc<MemoryLedger>,
    pub accounting: Arc<ResourceAccounting>,
    pub orders: Arc<MemoryOrderStore>,
    pub orchestrator: Arc<Orchestrator>,
}

pub struct StackOptions {
    pub supply: SupplyConfig,
    pub hold_timeout_seconds: u32,
    pub sweep_grace_seconds: u32,
    pub rate_limit_requests: u32,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            supply: SupplyConfig {
                class_a: 10,
                class_b: 50,
                goodies: 5,
            },
            hold_timeout_seconds: 300,
            sweep_grace_seconds: 0,
            rate_limit_requests: 1000,
        }
    }
}

pub async fn stack(options: StackOptions) -> TestStack {
    let ledger = MemoryLedger::new();
    let batcher = LedgerBatcher::spawn(
        Arc::clone(&ledger) as Arc<dyn LedgerClient>,
        BatcherConfig::default(),
    );
    let accounting = Arc::new(ResourceAccounting::new(batcher, options.supply));
    accounting.initialize_supply().await.expect("supply init");

    let orders = Arc::new(MemoryOrderStore::new());
    let sessions = Arc::new(MemorySessionStore::new(
        u64::from(options.hold_timeout_seconds) + 60,
    ));
    let limiter = Arc::new(MemoryRateLimiter::new());
    let mockpay = Arc::new(MockPay::new(
        "test-secret".to_string(),
        "http://localhost:0/payments/webhook".to_string(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&accounting),
        sessions,
        Arc::clone(&orders) as Arc<dyn OrderStore>,
        limiter,
        mockpay,
        OrchestratorConfig {
            hold_timeout_seconds: options.hold_timeout_seconds,
            sweep_grace_seconds: options.sweep_grace_seconds,
            rate_limit_requests: options.rate_limit_requests,
            rate_limit_window: Duration::from_secs(60),
        },
    ));

    TestStack {
        ledger,
        accounting,
        orders,
        orchestrator,
    }
}

impl TestStack {
    pub async fn order(&self, order_id: OrderId) -> Order {
        self.orders
            .get(order_id)
            .await
            .expect("order store")
            .expect("order exists")
    }

    pub async fn intent_of(&self, order_id: OrderId) -> IntentId {
        self.order(order_id).await.payment_intent_id
    }

    pub async fn snapshot(&self, account_id: u128) -> AccountSnapshot {
        self.ledger
            .lookup_accounts(vec![account_id])
            .await
            .expect("ledger lookup")
            .remove(0)
            .expect("account exists")
    }
}
