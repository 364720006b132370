//! Quantified invariants under concurrency: conservation, no over-sell,
//! goodie cap, and hold release.

mod common;

use boxoffice::accounting::{
    SupplyConfig, CLASS_A_BUDGET, CLASS_A_SPENT, GOODIE_BUDGET, GOODIE_SPENT,
};
use boxoffice::error::Error;
use boxoffice::ledger::AccountSnapshot;
use boxoffice::types::TicketClass;
use boxoffice::webhook::WebhookKind;
use common::{stack, StackOptions, TestStack};
use std::sync::Arc;

/// budget + spent + in-flight holds must always account for the full
/// supply: the budget pair mirrors every spent-side movement.
fn assert_conservation(budget: &AccountSnapshot, spent: &AccountSnapshot, supply: u64) {
    assert_eq!(budget.credits_posted, supply, "supply funded once");
    assert_eq!(budget.debits_posted, spent.credits_posted, "posted mirror");
    assert_eq!(budget.debits_pending, spent.credits_pending, "pending mirror");
    assert!(
        budget.debits_posted + budget.debits_pending <= budget.credits_posted,
        "budget never overdrawn"
    );
}

#[tokio::test]
async fn oversell_is_impossible_under_concurrency() {
    const CAPACITY: u64 = 10;
    const GOODIES: u64 = 5;
    const CLIENTS: usize = 40;

    let stack = Arc::new(
        stack(StackOptions {
            supply: SupplyConfig {
                class_a: CAPACITY,
                class_b: 1,
                goodies: GOODIES,
            },
            ..StackOptions::default()
        })
        .await,
    );

    let mut tasks = Vec::new();
    for i in 0..CLIENTS {
        let stack = Arc::clone(&stack);
        tasks.push(tokio::spawn(async move {
            stack
                .orchestrator
                .checkout(TicketClass::A, &format!("198.51.100.{i}"))
                .await
        }));
    }

    let mut winners = Vec::new();
    let mut sold_out = 0;
    for task in tasks {
        match task.await.expect("task") {
            Ok(outcome) => winners.push(outcome),
            Err(Error::SoldOut) => sold_out += 1,
            Err(e) => panic!("unexpected checkout error: {e}"),
        }
    }
    assert_eq!(winners.len() as u64, CAPACITY, "exactly capacity many holds");
    assert_eq!(sold_out, CLIENTS - CAPACITY as usize);

    // Conservation holds while everything is still pending.
    let budget = stack.snapshot(CLASS_A_BUDGET).await;
    let spent = stack.snapshot(CLASS_A_SPENT).await;
    assert_conservation(&budget, &spent, CAPACITY);
    assert_eq!(spent.credits_pending, CAPACITY);

    // Settle every winner; spent converges to capacity, never beyond.
    for outcome in &winners {
        let intent = stack.intent_of(outcome.order_id).await;
        stack
            .orchestrator
            .handle_webhook(&intent, WebhookKind::Paid)
            .await
            .expect("webhook");
    }

    let budget = stack.snapshot(CLASS_A_BUDGET).await;
    let spent = stack.snapshot(CLASS_A_SPENT).await;
    assert_conservation(&budget, &spent, CAPACITY);
    assert_eq!(spent.credits_posted, CAPACITY);
    assert_eq!(spent.credits_pending, 0);

    // Goodie cap: at most the goodie supply, regardless of demand.
    let goodies = stack.snapshot(GOODIE_SPENT).await;
    assert!(goodies.credits_posted <= GOODIES);
    let goodie_budget = stack.snapshot(GOODIE_BUDGET).await;
    assert_conservation(&goodie_budget, &goodies, GOODIES);
}

#[tokio::test]
async fn mixed_settlement_releases_every_failed_hold() {
    const CAPACITY: u64 = 20;

    let stack = stack(StackOptions {
        supply: SupplyConfig {
            class_a: CAPACITY,
            class_b: 1,
            goodies: 10,
        },
        ..StackOptions::default()
    })
    .await;

    let mut orders = Vec::new();
    for i in 0..CAPACITY {
        let outcome = stack
            .orchestrator
            .checkout(TicketClass::A, &format!("198.51.100.{i}"))
            .await
            .expect("checkout");
        orders.push(outcome.order_id);
    }

    // Even orders pay, odd orders fail.
    for (i, order_id) in orders.iter().enumerate() {
        let intent = stack.intent_of(*order_id).await;
        let kind = if i % 2 == 0 {
            WebhookKind::Paid
        } else {
            WebhookKind::Failed
        };
        stack
            .orchestrator
            .handle_webhook(&intent, kind)
            .await
            .expect("webhook");
    }

    let budget = stack.snapshot(CLASS_A_BUDGET).await;
    let spent = stack.snapshot(CLASS_A_SPENT).await;
    assert_conservation(&budget, &spent, CAPACITY);
    assert_eq!(spent.credits_posted, CAPACITY / 2);
    assert_eq!(spent.credits_pending, 0, "every failed hold released");
}

#[tokio::test]
async fn replayed_settlements_do_not_move_balances_twice() {
    let stack = stack(StackOptions::default()).await;

    let outcome = stack
        .orchestrator
        .checkout(TicketClass::A, "198.51.100.1")
        .await
        .expect("checkout");
    let intent = stack.intent_of(outcome.order_id).await;

    for _ in 0..6 {
        stack
            .orchestrator
            .handle_webhook(&intent, WebhookKind::Paid)
            .await
            .expect("webhook");
    }

    let spent = stack.snapshot(CLASS_A_SPENT).await;
    assert_eq!(spent.credits_posted, 1);
    assert_eq!(stack.snapshot(GOODIE_SPENT).await.credits_posted, 1);
}

/// The inventory view derived from the ledger agrees with the invariants.
#[tokio::test]
async fn inventory_view_matches_ledger() {
    let stack: TestStack = stack(StackOptions {
        supply: SupplyConfig {
            class_a: 4,
            class_b: 6,
            goodies: 2,
        },
        ..StackOptions::default()
    })
    .await;

    let a = stack
        .orchestrator
        .checkout(TicketClass::A, "198.51.100.1")
        .await
        .expect("checkout");
    let intent = stack.intent_of(a.order_id).await;
    stack
        .orchestrator
        .handle_webhook(&intent, WebhookKind::Paid)
        .await
        .expect("webhook");
    stack
        .orchestrator
        .checkout(TicketClass::A, "198.51.100.2")
        .await
        .expect("checkout");

    let inventory = stack.accounting.inventory().await.expect("inventory");
    let class_a = &inventory["A"];
    assert_eq!(class_a.capacity, 4);
    assert_eq!(class_a.sold, 1);
    assert_eq!(class_a.active_holds, 1);
    assert_eq!(class_a.available, 2);
    assert!(!class_a.sold_out);

    assert_eq!(stack.accounting.goodies_used().await.expect("goodies"), 1);
}
