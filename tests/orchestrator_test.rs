//! End-to-end scenarios against the embedded ledger and in-memory stores.

mod common;

use boxoffice::accounting::{
    SupplyConfig, CLASS_A_BUDGET, CLASS_A_SPENT, GOODIE_SPENT,
};
use boxoffice::error::Error;
use boxoffice::types::{OrderStatus, TicketClass};
use boxoffice::webhook::WebhookKind;
use common::{stack, StackOptions};
use std::time::Duration;

#[tokio::test]
async fn happy_path_checkout_and_paid_webhook() {
    let stack = stack(StackOptions {
        supply: SupplyConfig {
            class_a: 10,
            class_b: 50,
            goodies: 5,
        },
        ..StackOptions::default()
    })
    .await;

    let outcome = stack
        .orchestrator
        .checkout(TicketClass::A, "203.0.113.1")
        .await
        .unwrap();
    assert_eq!(outcome.amount_cents, 6500);
    assert!(outcome.redirect_url.starts_with("/payments/mock/mock_"));

    let order = stack.order(outcome.order_id).await;
    assert_eq!(order.status, OrderStatus::Held);
    assert!(order.goodie_pending_id.is_some());

    let intent = stack.intent_of(outcome.order_id).await;
    let settled = stack
        .orchestrator
        .handle_webhook(&intent, WebhookKind::Paid)
        .await
        .unwrap();
    assert_eq!(settled.status, OrderStatus::Paid);
    assert!(!settled.idempotent);

    let order = stack.order(outcome.order_id).await;
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid_at.is_some());

    assert_eq!(stack.snapshot(CLASS_A_SPENT).await.credits_posted, 1);
    assert_eq!(stack.snapshot(GOODIE_SPENT).await.credits_posted, 1);
}

#[tokio::test]
async fn concurrent_checkouts_sell_exactly_one() {
    let stack = stack(StackOptions {
        supply: SupplyConfig {
            class_a: 1,
            class_b: 1,
            goodies: 5,
        },
        ..StackOptions::default()
    })
    .await;

    let (first, second) = tokio::join!(
        stack.orchestrator.checkout(TicketClass::A, "203.0.113.1"),
        stack.orchestrator.checkout(TicketClass::A, "203.0.113.2"),
    );

    let results = [first, second];
    let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    let sold_out: Vec<_> = results
        .iter()
        .filter(|r| matches!(r, Err(Error::SoldOut)))
        .collect();
    assert_eq!(winners.len(), 1, "exactly one checkout wins");
    assert_eq!(sold_out.len(), 1, "the other is sold out");

    let winner = results
        .iter()
        .find_map(|r| r.as_ref().ok())
        .expect("one winner");
    let intent = stack.intent_of(winner.order_id).await;
    let settled = stack
        .orchestrator
        .handle_webhook(&intent, WebhookKind::Paid)
        .await
        .unwrap();
    assert_eq!(settled.status, OrderStatus::Paid);

    assert_eq!(stack.snapshot(CLASS_A_SPENT).await.credits_posted, 1);
}

#[tokio::test]
async fn sold_out_checkout_releases_goodie_hold() {
    let stack = stack(StackOptions {
        supply: SupplyConfig {
            class_a: 0,
            class_b: 1,
            goodies: 5,
        },
        ..StackOptions::default()
    })
    .await;

    let err = stack
        .orchestrator
        .checkout(TicketClass::A, "203.0.113.1")
        .await
        .unwrap_err();
    assert_eq!(err, Error::SoldOut);

    // No goodie hold leaks from the failed checkout.
    let goodie = stack
        .snapshot(boxoffice::accounting::GOODIE_BUDGET)
        .await;
    assert_eq!(goodie.debits_pending, 0);
    assert_eq!(goodie.debits_posted, 0);
}

#[tokio::test]
async fn goodie_exhaustion_does_not_block_checkout() {
    let stack = stack(StackOptions {
        supply: SupplyConfig {
            class_a: 10,
            class_b: 50,
            goodies: 0,
        },
        ..StackOptions::default()
    })
    .await;

    let outcome = stack
        .orchestrator
        .checkout(TicketClass::A, "203.0.113.1")
        .await
        .unwrap();
    let order = stack.order(outcome.order_id).await;
    assert!(order.goodie_pending_id.is_none());

    let intent = stack.intent_of(outcome.order_id).await;
    let settled = stack
        .orchestrator
        .handle_webhook(&intent, WebhookKind::Paid)
        .await
        .unwrap();
    assert_eq!(settled.status, OrderStatus::Paid);
    assert_eq!(stack.snapshot(GOODIE_SPENT).await.credits_posted, 0);
}

#[tokio::test]
async fn failed_webhook_cancels_and_restores_budget() {
    let stack = stack(StackOptions::default()).await;

    let outcome = stack
        .orchestrator
        .checkout(TicketClass::A, "203.0.113.1")
        .await
        .unwrap();
    let intent = stack.intent_of(outcome.order_id).await;

    let settled = stack
        .orchestrator
        .handle_webhook(&intent, WebhookKind::Failed)
        .await
        .unwrap();
    assert_eq!(settled.status, OrderStatus::Canceled);

    let order = stack.order(outcome.order_id).await;
    assert_eq!(order.status, OrderStatus::Canceled);

    let budget = stack.snapshot(CLASS_A_BUDGET).await;
    assert_eq!(budget.debits_pending, 0);
    assert_eq!(budget.debits_posted, 0);
    assert_eq!(stack.snapshot(CLASS_A_SPENT).await.credits_posted, 0);
}

#[tokio::test]
async fn late_paid_webhook_books_immediately_after_hold_expiry() {
    let stack = stack(StackOptions {
        hold_timeout_seconds: 1,
        ..StackOptions::default()
    })
    .await;

    let outcome = stack
        .orchestrator
        .checkout(TicketClass::A, "203.0.113.1")
        .await
        .unwrap();

    // Let the ledger expire the hold.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let budget = stack.snapshot(CLASS_A_BUDGET).await;
    assert_eq!(budget.debits_pending, 0, "hold auto-released");

    let intent = stack.intent_of(outcome.order_id).await;
    let settled = stack
        .orchestrator
        .handle_webhook(&intent, WebhookKind::Paid)
        .await
        .unwrap();
    assert_eq!(settled.status, OrderStatus::Paid);
    assert_eq!(stack.snapshot(CLASS_A_SPENT).await.credits_posted, 1);
}

#[tokio::test]
async fn late_paid_webhook_is_unfulfilled_when_budget_gone() {
    let stack = stack(StackOptions {
        supply: SupplyConfig {
            class_a: 1,
            class_b: 1,
            goodies: 0,
        },
        hold_timeout_seconds: 1,
        ..StackOptions::default()
    })
    .await;

    let slow = stack
        .orchestrator
        .checkout(TicketClass::A, "203.0.113.1")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // The released ticket goes to someone else, who pays promptly.
    let fast = stack
        .orchestrator
        .checkout(TicketClass::A, "203.0.113.2")
        .await
        .unwrap();
    let fast_intent = stack.intent_of(fast.order_id).await;
    stack
        .orchestrator
        .handle_webhook(&fast_intent, WebhookKind::Paid)
        .await
        .unwrap();

    // The slow order's late payment cannot be fulfilled.
    let slow_intent = stack.intent_of(slow.order_id).await;
    let settled = stack
        .orchestrator
        .handle_webhook(&slow_intent, WebhookKind::Paid)
        .await
        .unwrap();
    assert_eq!(settled.status, OrderStatus::PaidUnfulfilled);

    assert_eq!(stack.snapshot(CLASS_A_SPENT).await.credits_posted, 1);
}

#[tokio::test]
async fn duplicate_paid_webhooks_settle_once() {
    let stack = stack(StackOptions::default()).await;

    let outcome = stack
        .orchestrator
        .checkout(TicketClass::A, "203.0.113.1")
        .await
        .unwrap();
    let intent = stack.intent_of(outcome.order_id).await;

    let first = stack
        .orchestrator
        .handle_webhook(&intent, WebhookKind::Paid)
        .await
        .unwrap();
    assert!(!first.idempotent);

    for _ in 0..4 {
        let replay = stack
            .orchestrator
            .handle_webhook(&intent, WebhookKind::Paid)
            .await
            .unwrap();
        assert_eq!(replay.status, OrderStatus::Paid);
        assert!(replay.idempotent);
    }

    assert_eq!(stack.snapshot(CLASS_A_SPENT).await.credits_posted, 1);
}

#[tokio::test]
async fn paid_then_failed_keeps_terminal_status() {
    let stack = stack(StackOptions::default()).await;

    let outcome = stack
        .orchestrator
        .checkout(TicketClass::B, "203.0.113.1")
        .await
        .unwrap();
    let intent = stack.intent_of(outcome.order_id).await;

    stack
        .orchestrator
        .handle_webhook(&intent, WebhookKind::Paid)
        .await
        .unwrap();
    let late_failure = stack
        .orchestrator
        .handle_webhook(&intent, WebhookKind::Failed)
        .await
        .unwrap();
    assert!(late_failure.idempotent);
    assert_eq!(late_failure.status, OrderStatus::Paid);
}

#[tokio::test]
async fn sweep_times_out_expired_holds() {
    let stack = stack(StackOptions {
        hold_timeout_seconds: 1,
        sweep_grace_seconds: 0,
        ..StackOptions::default()
    })
    .await;

    let outcome = stack
        .orchestrator
        .checkout(TicketClass::A, "203.0.113.1")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let moved = stack.orchestrator.sweep_once().await.unwrap();
    assert_eq!(moved, 1);

    let order = stack.order(outcome.order_id).await;
    assert_eq!(order.status, OrderStatus::Timeout);

    // A webhook landing after the sweep is a no-op.
    let intent = stack.intent_of(outcome.order_id).await;
    let late = stack
        .orchestrator
        .handle_webhook(&intent, WebhookKind::Paid)
        .await
        .unwrap();
    assert!(late.idempotent);
    assert_eq!(late.status, OrderStatus::Timeout);
    assert_eq!(stack.snapshot(CLASS_A_SPENT).await.credits_posted, 0);
}

#[tokio::test]
async fn sweep_leaves_fresh_holds_alone() {
    let stack = stack(StackOptions::default()).await;

    let outcome = stack
        .orchestrator
        .checkout(TicketClass::A, "203.0.113.1")
        .await
        .unwrap();
    let moved = stack.orchestrator.sweep_once().await.unwrap();
    assert_eq!(moved, 0);
    assert_eq!(stack.order(outcome.order_id).await.status, OrderStatus::Held);
}

#[tokio::test]
async fn unknown_intent_is_rejected() {
    let stack = stack(StackOptions::default()).await;
    let err = stack
        .orchestrator
        .handle_webhook(
            &boxoffice::types::IntentId::new("mock_nope".to_string()),
            WebhookKind::Paid,
        )
        .await
        .unwrap_err();
    assert_eq!(err, Error::UnknownIntent);
}

#[tokio::test]
async fn checkout_rate_limit_sheds_clients() {
    let stack = stack(StackOptions {
        rate_limit_requests: 2,
        ..StackOptions::default()
    })
    .await;

    for _ in 0..2 {
        stack
            .orchestrator
            .checkout(TicketClass::B, "203.0.113.9")
            .await
            .unwrap();
    }
    let err = stack
        .orchestrator
        .checkout(TicketClass::B, "203.0.113.9")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RateLimited { .. }));

    // Other clients are unaffected.
    assert!(stack
        .orchestrator
        .checkout(TicketClass::B, "203.0.113.10")
        .await
        .is_ok());
}
