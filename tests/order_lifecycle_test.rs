//! Tests for the order status state machine and its settlement side
//! effects: coin credit on delivery, coin refund on cancellation, and
//! replay protection on both.

mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::json;
use storefront_api::{
    entities::{Coupon, DiscountType, OrderStatus, PaymentMethod, PaymentStatus},
    errors::ServiceError,
    services::checkout::CreateOrderInput,
    services::orders::OrderResponse,
};
use uuid::Uuid;

/// Seeds a customer with a funded wallet and a cart, then checks out.
/// Returns the customer id and the created order.
async fn place_order(
    app: &TestApp,
    wallet_balance: i64,
    coins_to_use: i64,
    coupon_code: Option<&str>,
) -> (Uuid, OrderResponse) {
    let customer_id = Uuid::new_v4();
    let address_id = app.seed_address(customer_id).await;
    if wallet_balance > 0 {
        app.seed_wallet(customer_id, wallet_balance).await;
    }

    let product_id = app.seed_product(&format!("LIFE-{customer_id}"), dec!(25)).await;
    app.add_cart_line(customer_id, product_id, None, 4).await;

    let order = app
        .state
        .services
        .checkout
        .create_order(CreateOrderInput {
            customer_id,
            address_id,
            payment_method: PaymentMethod::Card,
            coins_to_use,
            coupon_code: coupon_code.map(str::to_string),
        })
        .await
        .expect("checkout succeeds");

    (customer_id, order)
}

#[tokio::test]
async fn confirming_an_order_marks_it_paid() {
    let app = TestApp::new().await;
    let (_, order) = place_order(&app, 0, 0, None).await;
    assert_eq!(order.status, OrderStatus::Pending);

    let confirmed = app
        .state
        .services
        .order_status
        .update_status(order.id, OrderStatus::Confirmed, None)
        .await
        .unwrap();

    assert_eq!(confirmed.status, OrderStatus::Confirmed);
    assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
    assert!(confirmed.confirmed_at.is_some());
    assert_eq!(confirmed.version, order.version + 1);
}

#[tokio::test]
async fn delivery_credits_earned_coins_exactly_once() {
    let app = TestApp::new().await;
    // subtotal 100, coins 40 of 40, total = 100 + 5 + 25 - 40 = 90, earns 9
    let (customer_id, order) = place_order(&app, 40, 40, None).await;
    assert_eq!(order.coins_earned, 9);

    let svc = &app.state.services.order_status;
    svc.update_status(order.id, OrderStatus::Confirmed, None)
        .await
        .unwrap();
    let shipped = svc
        .update_status(order.id, OrderStatus::Shipped, Some("TRK-123".to_string()))
        .await
        .unwrap();
    assert_eq!(shipped.tracking_number.as_deref(), Some("TRK-123"));
    assert!(shipped.shipped_at.is_some());

    let delivered = svc
        .update_status(order.id, OrderStatus::Delivered, None)
        .await
        .unwrap();
    assert!(delivered.delivered_at.is_some());

    let wallet = app
        .state
        .services
        .wallet
        .get_wallet(customer_id)
        .await
        .unwrap();
    // 40 spent at checkout, 9 earned on delivery
    assert_eq!(wallet.balance, 9);
    assert_eq!(wallet.lifetime_earned, 40 + 9);

    // Replaying the delivery transition must not credit again.
    let replayed = svc
        .update_status(order.id, OrderStatus::Delivered, None)
        .await
        .unwrap();
    assert_eq!(replayed.status, OrderStatus::Delivered);

    let wallet = app
        .state
        .services
        .wallet
        .get_wallet(customer_id)
        .await
        .unwrap();
    assert_eq!(wallet.balance, 9);
    assert_eq!(wallet.lifetime_earned, 40 + 9);
}

#[tokio::test]
async fn cancelling_a_confirmed_order_refunds_spent_coins() {
    let app = TestApp::new().await;
    let (customer_id, order) = place_order(&app, 40, 40, None).await;
    assert_eq!(order.coins_used, 40);

    let svc = &app.state.services.order_status;
    svc.update_status(order.id, OrderStatus::Confirmed, None)
        .await
        .unwrap();

    let cancelled = svc.cancel_order(customer_id, order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
    assert!(cancelled.cancelled_at.is_some());

    let wallet = app
        .state
        .services
        .wallet
        .get_wallet(customer_id)
        .await
        .unwrap();
    assert_eq!(wallet.balance, 40);
}

#[tokio::test]
async fn a_shipped_order_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let (customer_id, order) = place_order(&app, 0, 0, None).await;

    let svc = &app.state.services.order_status;
    svc.update_status(order.id, OrderStatus::Confirmed, None)
        .await
        .unwrap();
    svc.update_status(order.id, OrderStatus::Shipped, None)
        .await
        .unwrap();

    let err = svc.cancel_order(customer_id, order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition(_));

    // The order is left unchanged.
    let fetched = app.state.services.order.get_order(order.id).await.unwrap();
    assert_eq!(fetched.status, OrderStatus::Shipped);
    assert!(fetched.cancelled_at.is_none());
}

#[tokio::test]
async fn out_of_order_transitions_are_rejected() {
    let app = TestApp::new().await;
    let (_, order) = place_order(&app, 0, 0, None).await;

    let svc = &app.state.services.order_status;

    let err = svc
        .update_status(order.id, OrderStatus::Shipped, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition(_));

    let err = svc
        .update_status(order.id, OrderStatus::Delivered, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition(_));

    let fetched = app.state.services.order.get_order(order.id).await.unwrap();
    assert_eq!(fetched.status, OrderStatus::Pending);
}

#[tokio::test]
async fn only_the_owner_can_cancel() {
    let app = TestApp::new().await;
    let (_, order) = place_order(&app, 0, 0, None).await;

    let err = app
        .state
        .services
        .order_status
        .cancel_order(Uuid::new_v4(), order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn cancellation_does_not_return_the_coupon() {
    let app = TestApp::new().await;
    let coupon_id = app
        .seed_coupon("KEEPME", DiscountType::Fixed, dec!(10))
        .await;

    let (customer_id, order) = place_order(&app, 0, 0, Some("KEEPME")).await;
    assert_eq!(order.coupon_id, Some(coupon_id));

    app.state
        .services
        .order_status
        .cancel_order(customer_id, order.id)
        .await
        .unwrap();

    // Usage count stays spent even though the order was cancelled.
    let coupon = Coupon::find_by_id(coupon_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(coupon.usage_count, 1);
}

#[tokio::test]
async fn lifecycle_over_http() {
    let app = TestApp::new().await;
    let (customer_id, order) = place_order(&app, 0, 0, None).await;

    // Confirm via the fulfillment endpoint.
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order.id),
            Some(json!({ "status": "confirmed" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "confirmed");
    assert_eq!(body["data"]["payment_status"], "paid");

    // Ship it, then cancelling through the customer endpoint conflicts.
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order.id),
            Some(json!({ "status": "shipped", "tracking_number": "TRK-9" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order.id),
            Some(json!({ "customer_id": customer_id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
