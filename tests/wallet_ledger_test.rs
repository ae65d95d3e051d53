//! Tests for the coin ledger: conditional debits, lazy provisioning, and
//! the non-negative balance invariant under competing debits.

mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use futures::future::join_all;
use storefront_api::errors::ServiceError;
use uuid::Uuid;

#[tokio::test]
async fn debit_and_credit_move_the_audit_counters() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    app.seed_wallet(customer_id, 200).await;

    let svc = app.state.services.wallet.clone();
    let db = app.state.db.clone();

    svc.debit(&*db, customer_id, 80).await.unwrap();
    svc.credit(&*db, customer_id, 30).await.unwrap();

    let wallet = svc.get_wallet(customer_id).await.unwrap();
    assert_eq!(wallet.balance, 150);
    assert_eq!(wallet.lifetime_spent, 80);
    assert_eq!(wallet.lifetime_earned, 200 + 30);
}

#[tokio::test]
async fn a_debit_past_the_balance_changes_nothing() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    app.seed_wallet(customer_id, 50).await;

    let svc = app.state.services.wallet.clone();
    let db = app.state.db.clone();

    let err = svc.debit(&*db, customer_id, 51).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientCoins(_));

    let wallet = svc.get_wallet(customer_id).await.unwrap();
    assert_eq!(wallet.balance, 50);
    assert_eq!(wallet.lifetime_spent, 0);
}

#[tokio::test]
async fn competing_debits_never_drive_the_balance_negative() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    app.seed_wallet(customer_id, 100).await;

    let svc = app.state.services.wallet.clone();
    let db = app.state.db.clone();

    // Four debits of 30 against a balance of 100: only three can fit.
    let attempts = (0..4).map(|_| {
        let svc = svc.clone();
        let db = db.clone();
        async move { svc.debit(&*db, customer_id, 30).await }
    });
    let results = join_all(attempts).await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 3);

    let wallet = svc.get_wallet(customer_id).await.unwrap();
    assert_eq!(wallet.balance, 10);
    assert_eq!(wallet.lifetime_spent, 90);
    assert!(wallet.balance >= 0);
}

#[tokio::test]
async fn wallets_are_provisioned_lazily_and_only_once() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let svc = app.state.services.wallet.clone();
    let db = app.state.db.clone();

    let first = svc.get_or_create_wallet(&*db, customer_id).await.unwrap();
    let second = svc.get_or_create_wallet(&*db, customer_id).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.balance, 0);
}

#[tokio::test]
async fn crediting_an_unknown_customer_provisions_the_wallet() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let svc = app.state.services.wallet.clone();
    let db = app.state.db.clone();

    svc.credit(&*db, customer_id, 25).await.unwrap();

    let wallet = svc.get_wallet(customer_id).await.unwrap();
    assert_eq!(wallet.balance, 25);
    assert_eq!(wallet.lifetime_earned, 25);
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    app.seed_wallet(customer_id, 10).await;

    let svc = app.state.services.wallet.clone();
    let db = app.state.db.clone();

    assert_matches!(
        svc.debit(&*db, customer_id, 0).await.unwrap_err(),
        ServiceError::InvalidInput(_)
    );
    assert_matches!(
        svc.credit(&*db, customer_id, -5).await.unwrap_err(),
        ServiceError::InvalidInput(_)
    );
}

#[tokio::test]
async fn wallet_endpoint_returns_a_zeroed_view_for_new_customers() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let response = app
        .request(Method::GET, &format!("/api/v1/wallets/{customer_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["data"]["balance"], 0);
    assert_eq!(body["data"]["lifetime_earned"], 0);
}
