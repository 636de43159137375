//! The axum surface: routing, owner header, status codes and error bodies.

mod common;

use common::*;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use checkstand_api::{router, OWNER_HEADER};
use checkstand_core::PaymentProvider;
use checkstand_db::Database;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, owner: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(owner) = owner {
        builder = builder.header(OWNER_HEADER, owner);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, owner: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(OWNER_HEADER, owner)
        .body(Body::empty())
        .unwrap()
}

async fn app_with_product(stock: Option<i64>) -> (Router, Database, String) {
    let db = test_db().await;
    let product = seed_product(&db, "kettle", 1000, stock).await;
    let (state, _, _) = test_state(db.clone());
    (router(state), db, product.id)
}

fn cart(product_id: &str, quantity: i64, unit_price_cents: i64) -> Value {
    serde_json::to_value(checkout_request(vec![line(product_id, quantity, unit_price_cents)])).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _, _) = app_with_product(None).await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_preview_quotes_without_owner() {
    let (app, _, product_id) = app_with_product(Some(5)).await;

    let body = json!({"lines": [{"product_id": product_id, "quantity": 2, "unit_price_cents": 1000}]});
    let (status, quote) = send(&app, post_json("/api/checkout/preview", None, &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["subtotal"], 2000);
    assert_eq!(quote["tax"], 160);
    assert_eq!(quote["shipping"], 999);
    assert_eq!(quote["total"], 3159);
}

#[tokio::test]
async fn test_checkout_creates_order() {
    let (app, db, product_id) = app_with_product(Some(5)).await;

    let (status, body) = send(&app, post_json("/api/checkout", Some(OWNER), &cart(&product_id, 2, 1000))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["payment_status"], "PENDING");
    assert_eq!(body["total_cents"], 3159);
    assert_eq!(body["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(db.catalog().stock_quantity(&product_id).await.unwrap(), Some(3));

    let id = body["id"].as_str().unwrap();
    let (status, fetched) = send(&app, get(&format!("/api/orders/{}", id), OWNER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["order_number"], body["order_number"]);

    let (status, list) = send(&app, get("/api/orders", OWNER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_checkout_requires_owner_header() {
    let (app, _, product_id) = app_with_product(Some(5)).await;

    let (status, body) = send(&app, post_json("/api/checkout", None, &cart(&product_id, 1, 1000))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_rejected_cart_lists_issues() {
    let (app, _, product_id) = app_with_product(Some(1)).await;

    let (status, body) = send(&app, post_json("/api/checkout", Some(OWNER), &cart(&product_id, 2, 1200))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "CHECKOUT_REJECTED");
    assert_eq!(body["issues"][0]["line"], 0);
    assert_eq!(body["issues"][0]["reason"], "out_of_stock");
}

#[tokio::test]
async fn test_unknown_order_is_404() {
    let (app, _, _) = app_with_product(None).await;

    let (status, body) = send(&app, get("/api/orders/does-not-exist", OWNER)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_payment_and_cancel_routes() {
    let (app, _, product_id) = app_with_product(Some(5)).await;
    let (_, order) = send(&app, post_json("/api/checkout", Some(OWNER), &cart(&product_id, 1, 1000))).await;
    let id = order["id"].as_str().unwrap();

    let (status, session) = send(
        &app,
        post_json(&format!("/api/orders/{}/payments", id), Some(OWNER), &json!({"provider": "paypal"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(session["redirect_url"].as_str().unwrap().contains("approve"));
    assert_eq!(session["order"]["payment_provider"], "paypal");

    // Open payment holds the reservation
    let (status, body) = send(&app, post_json(&format!("/api/orders/{}/cancel", id), Some(OWNER), &json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let (_, unpaid) = send(&app, post_json("/api/checkout", Some(OWNER), &cart(&product_id, 1, 1000))).await;
    let unpaid_id = unpaid["id"].as_str().unwrap();

    let (status, cancelled) = send(&app, post_json(&format!("/api/orders/{}/cancel", unpaid_id), Some(OWNER), &json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");

    let (status, body) = send(&app, post_json(&format!("/api/orders/{}/cancel", unpaid_id), Some(OWNER), &json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_webhook_acknowledges_and_dedups() {
    let db = test_db().await;
    let product = seed_product(&db, "kettle", 1000, Some(5)).await;
    let (state, _, _) = test_state(db.clone());
    let app = router(state);

    let (_, order) = send(&app, post_json("/api/checkout", Some(OWNER), &cart(&product.id, 2, 1000))).await;
    let order = db.orders().get(order["id"].as_str().unwrap()).await.unwrap().unwrap();
    let event = stripe_event("evt_http", "payment_intent.succeeded", &order, order.total_cents);

    for _ in 0..2 {
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/stripe")
            .body(Body::from(event.clone()))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], true);
    }

    let order = db.orders().get(&order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_metadata["events"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_webhook_signature_failure_hides_reason() {
    let db = test_db().await;
    let (state, _, _) = test_state(db);
    let app = router(state.with_verifier(PaymentProvider::Paypal, Arc::new(FakeVerifier::rejecting())));

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/paypal")
        .body(Body::from(r#"{"id":"WH-1","event_type":"PAYMENT.CAPTURE.COMPLETED","resource":{}}"#))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_SIGNATURE");
    assert_eq!(body["message"], "Invalid webhook signature");
}
