mod common;

use chrono::Utc;
use std::sync::Arc;

use common::{customer, product, transaction, Fixture, FlakyTransactionRepository, StubGateway};
use ticketing_core::domain::{GatewayNotification, TransactionStatus};
use ticketing_core::ports::{RepositoryError, TransactionRepository};
use ticketing_core::use_cases::{CheckoutError, CheckoutService, NotificationOutcome};

fn notification(order_id: &str, payment_type: &str, status: &str, fraud: &str) -> GatewayNotification {
    GatewayNotification {
        order_id: order_id.to_string(),
        payment_type: payment_type.to_string(),
        transaction_status: status.to_string(),
        fraud_status: fraud.to_string(),
    }
}

#[tokio::test]
async fn test_accepted_card_capture_marks_paid_and_keeps_sale() {
    let fx = Fixture::new();
    fx.products.insert(product(1, 5, 100)).await;

    let tx = fx.service.checkout(1, &customer(7)).await.unwrap();
    let outcome = fx
        .service
        .apply_notification(&notification(&tx.order_id(), "credit_card", "capture", "accept"))
        .await
        .unwrap();

    assert_eq!(outcome, NotificationOutcome::Applied(TransactionStatus::Paid));
    let stored = fx.transactions.read_by_id(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Paid);
    // One unit below the pre-checkout stock.
    assert_eq!(fx.stock_of(1).await, 4);
}

#[tokio::test]
async fn test_settlement_marks_paid() {
    let fx = Fixture::new();
    fx.products.insert(product(1, 5, 100)).await;

    let tx = fx.service.checkout(1, &customer(7)).await.unwrap();
    fx.service
        .apply_notification(&notification(&tx.order_id(), "bank_transfer", "settlement", ""))
        .await
        .unwrap();

    let stored = fx.transactions.read_by_id(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Paid);
    assert_eq!(fx.stock_of(1).await, 4);
}

#[tokio::test]
async fn test_cancellation_releases_reserved_unit() {
    for status in ["deny", "expire", "cancel"] {
        let fx = Fixture::new();
        fx.products.insert(product(1, 5, 100)).await;

        let tx = fx.service.checkout(1, &customer(7)).await.unwrap();
        assert_eq!(fx.stock_of(1).await, 4);

        let outcome = fx
            .service
            .apply_notification(&notification(&tx.order_id(), "gopay", status, ""))
            .await
            .unwrap();

        assert_eq!(outcome, NotificationOutcome::Applied(TransactionStatus::Cancelled), "{status}");
        assert_eq!(fx.stock_of(1).await, 5, "{status}");
        assert_eq!(
            fx.transactions.read_by_id(tx.id).await.unwrap().status,
            TransactionStatus::Cancelled
        );
    }
}

#[tokio::test]
async fn test_expire_on_paid_transaction_is_a_no_op() {
    let fx = Fixture::new();
    fx.products.insert(product(1, 5, 100)).await;
    fx.transactions.insert(transaction(10, 1, TransactionStatus::Paid)).await;

    let outcome = fx
        .service
        .apply_notification(&notification("10", "gopay", "expire", ""))
        .await
        .unwrap();

    assert_eq!(outcome, NotificationOutcome::Unchanged);
    assert_eq!(
        fx.transactions.read_by_id(10).await.unwrap().status,
        TransactionStatus::Paid
    );
    assert_eq!(fx.stock_of(1).await, 5);
}

#[tokio::test]
async fn test_unknown_order_id_is_not_found() {
    let fx = Fixture::new();
    fx.products.insert(product(1, 5, 100)).await;

    let err = fx
        .service
        .apply_notification(&notification("999", "gopay", "settlement", ""))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::NotFound(_)));
    assert!(fx.transactions.is_empty().await);
    assert_eq!(fx.stock_of(1).await, 5);
}

#[tokio::test]
async fn test_malformed_order_id_is_not_found() {
    let fx = Fixture::new();

    let err = fx
        .service
        .apply_notification(&notification("order-abc", "gopay", "settlement", ""))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::NotFound(_)));
}

#[tokio::test]
async fn test_unmapped_status_is_ignored() {
    let fx = Fixture::new();
    fx.products.insert(product(1, 5, 100)).await;
    let tx = fx.service.checkout(1, &customer(7)).await.unwrap();

    for (payment_type, status, fraud) in [
        ("gopay", "pending", ""),
        ("credit_card", "capture", "challenge"),
        ("bank_transfer", "capture", "accept"),
        ("gopay", "refund", ""),
    ] {
        let outcome = fx
            .service
            .apply_notification(&notification(&tx.order_id(), payment_type, status, fraud))
            .await
            .unwrap();
        assert_eq!(outcome, NotificationOutcome::Ignored);
    }

    assert_eq!(
        fx.transactions.read_by_id(tx.id).await.unwrap().status,
        TransactionStatus::Pending
    );
    assert_eq!(fx.stock_of(1).await, 4);
}

#[tokio::test]
async fn test_duplicate_notifications_apply_once() {
    let fx = Fixture::new();
    fx.products.insert(product(1, 5, 100)).await;
    let tx = fx.service.checkout(1, &customer(7)).await.unwrap();
    let cancel = notification(&tx.order_id(), "gopay", "cancel", "");

    let first = fx.service.apply_notification(&cancel).await.unwrap();
    let second = fx.service.apply_notification(&cancel).await.unwrap();

    assert_eq!(first, NotificationOutcome::Applied(TransactionStatus::Cancelled));
    assert_eq!(second, NotificationOutcome::Unchanged);
    assert_eq!(fx.stock_of(1).await, 5);
}

#[tokio::test]
async fn test_concurrent_duplicate_cancellations_release_once() {
    let fx = Fixture::new();
    fx.products.insert(product(1, 5, 100)).await;
    let tx = fx.service.checkout(1, &customer(7)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = fx.service.clone();
        let cancel = notification(&tx.order_id(), "gopay", "expire", "");
        handles.push(tokio::spawn(async move { service.apply_notification(&cancel).await }));
    }

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() != NotificationOutcome::Unchanged {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(fx.stock_of(1).await, 5);
}

#[tokio::test]
async fn test_failed_cancellation_keeps_unit_reserved_until_retry() {
    let fx = Fixture::new();
    fx.products.insert(product(1, 5, 100)).await;
    let tx = fx.service.checkout(1, &customer(7)).await.unwrap();
    assert_eq!(fx.stock_of(1).await, 4);

    let service = CheckoutService::new(
        Arc::new(FlakyTransactionRepository::failing_cancels(fx.transactions.clone(), 1)),
        Arc::new(fx.products.clone()),
        fx.gateway.clone(),
        common::BUDGET,
    );
    let expire = notification(&tx.order_id(), "gopay", "expire", "");

    let first = service.apply_notification(&expire).await.unwrap_err();
    assert!(matches!(first, CheckoutError::Store(RepositoryError::Unavailable(_))));
    let stored = fx.transactions.read_by_id(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
    assert_eq!(fx.stock_of(1).await, 4);

    let retry = service.apply_notification(&expire).await.unwrap();
    assert_eq!(retry, NotificationOutcome::Applied(TransactionStatus::Cancelled));
    assert_eq!(fx.stock_of(1).await, 5);
}

#[tokio::test]
async fn test_paid_then_cancel_keeps_sale() {
    let fx = Fixture::new();
    fx.products.insert(product(1, 5, 100)).await;
    let tx = fx.service.checkout(1, &customer(7)).await.unwrap();

    fx.service
        .apply_notification(&notification(&tx.order_id(), "gopay", "settlement", ""))
        .await
        .unwrap();
    let outcome = fx
        .service
        .apply_notification(&notification(&tx.order_id(), "gopay", "cancel", ""))
        .await
        .unwrap();

    assert_eq!(outcome, NotificationOutcome::Unchanged);
    assert_eq!(fx.stock_of(1).await, 4);
}

#[tokio::test]
async fn test_expire_abandoned_cancels_checkouts_without_payment_url() {
    let fx = Fixture::with_gateway(StubGateway::failing());
    fx.products.insert(product(1, 5, 100)).await;

    fx.service.checkout(1, &customer(7)).await.unwrap_err();
    fx.service.checkout(1, &customer(8)).await.unwrap_err();
    assert_eq!(fx.stock_of(1).await, 3);

    let cancelled = fx
        .service
        .expire_abandoned(Utc::now() + chrono::Duration::seconds(1))
        .await
        .unwrap();

    assert_eq!(cancelled, 2);
    assert_eq!(fx.stock_of(1).await, 5);
    for tx in fx.transactions.all().await {
        assert_eq!(tx.status, TransactionStatus::Cancelled);
    }
}

#[tokio::test]
async fn test_expire_abandoned_skips_recent_and_linked_transactions() {
    let fx = Fixture::with_gateway(StubGateway::failing());
    fx.products.insert(product(1, 5, 100)).await;
    fx.transactions.insert(transaction(50, 1, TransactionStatus::Pending)).await;

    fx.service.checkout(1, &customer(7)).await.unwrap_err();

    let cancelled = fx
        .service
        .expire_abandoned(Utc::now() - chrono::Duration::minutes(30))
        .await
        .unwrap();

    assert_eq!(cancelled, 0);
    assert_eq!(fx.stock_of(1).await, 4);
    assert_eq!(
        fx.transactions.read_by_id(50).await.unwrap().status,
        TransactionStatus::Pending
    );
}
