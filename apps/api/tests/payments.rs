//! Payment creation and the return-to-site flow, against fake providers.

mod common;

use common::*;

use axum::http::HeaderMap;

use checkstand_api::services::{checkout, orders, payments, reconciler};
use checkstand_api::{AppState, ReconcileOutcome, ServiceError};
use checkstand_core::{Money, Order, OrderStatus, PaymentProvider, PaymentStatus};
use checkstand_db::Database;

async fn placed_order(state: &AppState, db: &Database) -> Order {
    let product = seed_product(db, "tent", 1000, Some(10)).await;
    checkout::place_order(state, OWNER, &checkout_request(vec![line(&product.id, 2, 1000)]))
        .await
        .unwrap()
        .order
}

#[tokio::test]
async fn test_stripe_payment_attaches_intent() {
    let db = test_db().await;
    let (state, stripe, _) = test_state(db.clone());
    let order = placed_order(&state, &db).await;

    let session = payments::create_payable(&state, OWNER, &order.id, PaymentProvider::Stripe)
        .await
        .unwrap();

    let intent = format!("pi_{}", order.order_number);
    assert_eq!(session.external_id, intent);
    assert_eq!(session.client_secret.as_deref(), Some(format!("{}_secret_test", intent).as_str()));
    assert!(session.redirect_url.is_none());
    assert_eq!(stripe.created(), vec![order.order_number.clone()]);

    assert_eq!(session.order.payment_provider, Some(PaymentProvider::Stripe));
    assert_eq!(session.order.payment_intent_id.as_deref(), Some(intent.as_str()));
    assert_eq!(session.order.payment_metadata["stripe_create"]["id"], intent.as_str());
    // Correlation never touches payment state
    assert_eq!(session.order.status, OrderStatus::Pending);
    assert_eq!(session.order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_creating_payment_twice_is_safe() {
    let db = test_db().await;
    let (state, _, paypal) = test_state(db.clone());
    let order = placed_order(&state, &db).await;

    let first = payments::create_payable(&state, OWNER, &order.id, PaymentProvider::Paypal)
        .await
        .unwrap();
    let second = payments::create_payable(&state, OWNER, &order.id, PaymentProvider::Paypal)
        .await
        .unwrap();

    assert_eq!(first.external_id, second.external_id);
    assert_eq!(paypal.created().len(), 2);
    assert_eq!(
        second.redirect_url.as_deref(),
        Some(format!("https://paypal.test/approve/PP-{}", order.order_number).as_str())
    );
    assert_eq!(second.order.provider_order_id.as_deref(), Some(first.external_id.as_str()));
}

#[tokio::test]
async fn test_paid_order_cannot_be_charged_again() {
    let db = test_db().await;
    let (state, stripe, _) = test_state(db.clone());
    let order = placed_order(&state, &db).await;

    let body = stripe_event("evt_paid", "payment_intent.succeeded", &order, order.total_cents);
    reconciler::handle_webhook(&state, PaymentProvider::Stripe, &body, &HeaderMap::new())
        .await
        .unwrap();

    let err = payments::create_payable(&state, OWNER, &order.id, PaymentProvider::Stripe)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::AlreadyPaid { ref order_number } if *order_number == order.order_number));
    assert!(stripe.created().is_empty());
}

#[tokio::test]
async fn test_cancelled_order_cannot_be_paid() {
    let db = test_db().await;
    let (state, stripe, _) = test_state(db.clone());
    let order = placed_order(&state, &db).await;

    orders::cancel_order(&state, OWNER, &order.id).await.unwrap();

    let err = payments::create_payable(&state, OWNER, &order.id, PaymentProvider::Stripe)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition { .. }));
    assert!(stripe.created().is_empty());
}

#[tokio::test]
async fn test_payment_requires_enabled_provider_and_owner() {
    let db = test_db().await;
    let (state, _, _) = test_state(db.clone());
    let order = placed_order(&state, &db).await;

    let err = payments::create_payable(&state, "intruder", &order.id, PaymentProvider::Stripe)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let bare = AppState::new(db, Default::default());
    let err = payments::create_payable(&bare, OWNER, &order.id, PaymentProvider::Paypal)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn test_return_captures_and_confirms() {
    let db = test_db().await;
    let (state, _, paypal) = test_state(db.clone());
    let order = placed_order(&state, &db).await;

    let session = payments::create_payable(&state, OWNER, &order.id, PaymentProvider::Paypal)
        .await
        .unwrap();
    paypal.set_capture(true, Some(order.total()));

    let details = payments::confirm_return(&state, OWNER, &order.id).await.unwrap();

    assert_eq!(paypal.captures(), vec![session.external_id]);
    assert_eq!(details.order.status, OrderStatus::Confirmed);
    assert_eq!(details.order.payment_status, PaymentStatus::Paid);
    assert_eq!(details.order.payment_metadata["events"][0]["source"], "return");
}

#[tokio::test]
async fn test_return_before_completion_leaves_order_pending() {
    let db = test_db().await;
    let (state, stripe, _) = test_state(db.clone());
    let order = placed_order(&state, &db).await;

    payments::create_payable(&state, OWNER, &order.id, PaymentProvider::Stripe)
        .await
        .unwrap();
    stripe.set_capture(false, None);

    let details = payments::confirm_return(&state, OWNER, &order.id).await.unwrap();
    assert_eq!(details.order.payment_status, PaymentStatus::Pending);
    assert_eq!(stripe.captures().len(), 1);
}

#[tokio::test]
async fn test_return_and_webhook_apply_once() {
    let db = test_db().await;
    let (state, _, paypal) = test_state(db.clone());
    let order = placed_order(&state, &db).await;

    let session = payments::create_payable(&state, OWNER, &order.id, PaymentProvider::Paypal)
        .await
        .unwrap();
    paypal.set_capture(true, Some(order.total()));
    payments::confirm_return(&state, OWNER, &order.id).await.unwrap();

    // The provider's own notification arrives afterwards
    let body = paypal_event(
        "WH-CAPTURE-1",
        "PAYMENT.CAPTURE.COMPLETED",
        Some(&order.order_number),
        &session.external_id,
        "31.59",
    );
    let outcome = reconciler::handle_webhook(&state, PaymentProvider::Paypal, &body, &HeaderMap::new())
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::NoOp);

    let order = db.orders().get(&order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.payment_metadata["events"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_return_after_webhook_skips_the_provider() {
    let db = test_db().await;
    let (state, _, paypal) = test_state(db.clone());
    let order = placed_order(&state, &db).await;

    let session = payments::create_payable(&state, OWNER, &order.id, PaymentProvider::Paypal)
        .await
        .unwrap();
    let body = paypal_event(
        "WH-CAPTURE-2",
        "PAYMENT.CAPTURE.COMPLETED",
        Some(&order.order_number),
        &session.external_id,
        "31.59",
    );
    reconciler::handle_webhook(&state, PaymentProvider::Paypal, &body, &HeaderMap::new())
        .await
        .unwrap();

    let details = payments::confirm_return(&state, OWNER, &order.id).await.unwrap();

    assert_eq!(details.order.payment_status, PaymentStatus::Paid);
    assert!(paypal.captures().is_empty());
}

#[tokio::test]
async fn test_return_with_wrong_amount_is_not_applied() {
    let db = test_db().await;
    let (state, _, paypal) = test_state(db.clone());
    let order = placed_order(&state, &db).await;

    payments::create_payable(&state, OWNER, &order.id, PaymentProvider::Paypal)
        .await
        .unwrap();
    paypal.set_capture(true, Some(Money::from_cents(100)));

    let details = payments::confirm_return(&state, OWNER, &order.id).await.unwrap();

    assert_eq!(details.order.payment_status, PaymentStatus::Pending);
    assert_eq!(details.order.payment_metadata["anomalies"][0]["source"], "return");
}

#[tokio::test]
async fn test_return_without_payment_is_rejected() {
    let db = test_db().await;
    let (state, _, _) = test_state(db.clone());
    let order = placed_order(&state, &db).await;

    let err = payments::confirm_return(&state, OWNER, &order.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}
