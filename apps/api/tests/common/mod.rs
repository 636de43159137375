//! Shared fixtures for the service-level tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::{json, Value};

use checkstand_api::AppState;
use checkstand_core::{
    AddressInput, CartLine, CheckoutRequest, Money, Order, PaymentProvider, PricingPolicy, ProductSnapshot,
};
use checkstand_db::{Database, DbConfig, NewProduct};
use checkstand_payments::{
    Capture, Payable, PayableOrder, PaymentGateway, PaymentResult, SignatureVerifier,
};

pub const OWNER: &str = "user-1";

// =============================================================================
// State
// =============================================================================

pub async fn test_db() -> Database {
    Database::new(DbConfig::in_memory())
        .await
        .expect("Failed to create test database")
}

/// A throwaway file database with a real multi-connection pool, for tests
/// that need writers to actually overlap.
pub struct FileDb {
    pub db: Database,
    path: PathBuf,
}

impl FileDb {
    pub async fn new() -> Self {
        let path = std::env::temp_dir().join(format!("checkstand-test-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(8))
            .await
            .expect("Failed to create file database");
        FileDb { db, path }
    }
}

impl Drop for FileDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// State with both fake providers wired in and verifiers that accept.
pub fn test_state(db: Database) -> (AppState, Arc<FakeGateway>, Arc<FakeGateway>) {
    let stripe = Arc::new(FakeGateway::new(PaymentProvider::Stripe));
    let paypal = Arc::new(FakeGateway::new(PaymentProvider::Paypal));

    let state = AppState::new(db, PricingPolicy::default())
        .with_gateway(stripe.clone())
        .with_gateway(paypal.clone())
        .with_verifier(PaymentProvider::Stripe, Arc::new(FakeVerifier::accepting()))
        .with_verifier(PaymentProvider::Paypal, Arc::new(FakeVerifier::accepting()))
        .with_claim_lease(Duration::from_secs(60));

    (state, stripe, paypal)
}

// =============================================================================
// Catalog and Carts
// =============================================================================

pub async fn seed_product(db: &Database, slug: &str, price_cents: i64, stock: Option<i64>) -> ProductSnapshot {
    db.catalog()
        .insert_product(&NewProduct::new(slug, slug, price_cents, stock))
        .await
        .expect("Failed to seed product")
}

pub fn address() -> AddressInput {
    AddressInput {
        full_name: "Ada Lovelace".to_string(),
        line1: "12 Analytical Row".to_string(),
        line2: None,
        city: "London".to_string(),
        region: None,
        postal_code: "NW1 6XE".to_string(),
        country: "GB".to_string(),
        phone: None,
    }
}

pub fn line(product_id: &str, quantity: i64, unit_price_cents: i64) -> CartLine {
    CartLine {
        product_id: product_id.to_string(),
        variant_id: None,
        quantity,
        unit_price_cents,
    }
}

/// A checkout whose claimed subtotal matches the claimed line prices.
pub fn checkout_request(lines: Vec<CartLine>) -> CheckoutRequest {
    let claimed_subtotal_cents = lines.iter().map(|l| l.unit_price_cents * l.quantity).sum();
    CheckoutRequest {
        lines,
        shipping_address: address(),
        billing_address: None,
        billing_same_as_shipping: true,
        notes: None,
        claimed_subtotal_cents,
    }
}

// =============================================================================
// Webhook Bodies
// =============================================================================

pub fn stripe_event(event_id: &str, event_type: &str, order: &Order, amount_cents: i64) -> Vec<u8> {
    let body = json!({
        "id": event_id,
        "type": event_type,
        "data": {"object": {
            "id": format!("pi_{}", order.order_number),
            "object": "payment_intent",
            "amount": order.total_cents,
            "amount_received": amount_cents,
            "metadata": {"order_number": order.order_number, "order_id": order.id}
        }}
    });
    serde_json::to_vec(&body).expect("serialize event")
}

pub fn paypal_event(event_id: &str, event_type: &str, custom_id: Option<&str>, paypal_order_id: &str, amount: &str) -> Vec<u8> {
    let mut resource = json!({
        "id": format!("CAP-{}", event_id),
        "status": "COMPLETED",
        "amount": {"currency_code": "USD", "value": amount},
        "supplementary_data": {"related_ids": {"order_id": paypal_order_id}}
    });
    if let Some(custom_id) = custom_id {
        resource["custom_id"] = json!(custom_id);
    }
    let body = json!({
        "id": event_id,
        "event_type": event_type,
        "resource": resource,
    });
    serde_json::to_vec(&body).expect("serialize event")
}

// =============================================================================
// Fake Providers
// =============================================================================

/// In-process stand-in for a payment provider.
pub struct FakeGateway {
    provider: PaymentProvider,
    created: Mutex<Vec<String>>,
    captures: Mutex<Vec<String>>,
    capture_result: Mutex<Option<(bool, Option<Money>)>>,
}

impl FakeGateway {
    pub fn new(provider: PaymentProvider) -> Self {
        FakeGateway {
            provider,
            created: Mutex::new(Vec::new()),
            captures: Mutex::new(Vec::new()),
            capture_result: Mutex::new(None),
        }
    }

    /// What `capture` reports. Unset means completed, with no amount.
    pub fn set_capture(&self, completed: bool, amount: Option<Money>) {
        *self.capture_result.lock().unwrap() = Some((completed, amount));
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn captures(&self) -> Vec<String> {
        self.captures.lock().unwrap().clone()
    }

    pub fn external_id_for(&self, order_number: &str) -> String {
        match self.provider {
            PaymentProvider::Stripe => format!("pi_{}", order_number),
            PaymentProvider::Paypal => format!("PP-{}", order_number),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    async fn create_payable(&self, order: &PayableOrder) -> PaymentResult<Payable> {
        self.created.lock().unwrap().push(order.order_number.clone());
        let external_id = self.external_id_for(&order.order_number);

        Ok(match self.provider {
            PaymentProvider::Stripe => Payable {
                external_id: external_id.clone(),
                redirect_url: None,
                client_secret: Some(format!("{}_secret_test", external_id)),
                provider_status: "requires_payment_method".to_string(),
                metadata: json!({"id": external_id, "amount": order.total.cents()}),
            },
            PaymentProvider::Paypal => Payable {
                external_id: external_id.clone(),
                redirect_url: Some(format!("https://paypal.test/approve/{}", external_id)),
                client_secret: None,
                provider_status: "CREATED".to_string(),
                metadata: json!({"id": external_id, "status": "CREATED"}),
            },
        })
    }

    async fn capture(&self, external_id: &str) -> PaymentResult<Capture> {
        self.captures.lock().unwrap().push(external_id.to_string());
        let (completed, amount) = self.capture_result.lock().unwrap().unwrap_or((true, None));

        Ok(Capture {
            amount,
            provider_status: if completed { "COMPLETED" } else { "PENDING" }.to_string(),
            completed,
            metadata: Value::Null,
        })
    }

    fn requires_capture(&self) -> bool {
        self.provider == PaymentProvider::Paypal
    }
}

/// Signature verifier with a fixed answer.
pub struct FakeVerifier {
    accept: bool,
}

impl FakeVerifier {
    pub fn accepting() -> Self {
        FakeVerifier { accept: true }
    }

    pub fn rejecting() -> Self {
        FakeVerifier { accept: false }
    }
}

#[async_trait]
impl SignatureVerifier for FakeVerifier {
    async fn verify(&self, _body: &[u8], _headers: &HeaderMap) -> PaymentResult<bool> {
        Ok(self.accept)
    }
}
