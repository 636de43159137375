//! # Payment Gateway Contract
//!
//! ```text
//! create_payable(order)  ──► { external_id, redirect_url | client_secret, provider_status }
//! capture(external_id)   ──► { amount, provider_status, completed }
//! ```
//!
//! Both calls are exactly as idempotent as the provider's API. Adapters
//! send provider idempotency keys derived from the order number but keep
//! no dedup state of their own; duplicate webhook handling lives in the
//! reconciler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PaymentError, PaymentResult};
use checkstand_core::{Money, Order, PaymentProvider};

/// What a provider needs to know to charge for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayableOrder {
    pub order_id: String,
    pub order_number: String,
    pub total: Money,
}

impl PayableOrder {
    pub fn from_order(order: &Order) -> Self {
        PayableOrder {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            total: order.total(),
        }
    }

    /// Idempotency key for the create call. Retrying checkout for the same
    /// order hits the provider's replay cache instead of a second charge.
    pub fn idempotency_key(&self) -> String {
        format!("create-{}", self.order_number)
    }
}

/// A payable created at the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payable {
    /// PaymentIntent id (Stripe) or order id (PayPal).
    pub external_id: String,
    /// Where to send the customer (PayPal approve link).
    pub redirect_url: Option<String>,
    /// Token for client-side confirmation (Stripe client secret).
    pub client_secret: Option<String>,
    pub provider_status: String,
    /// Provider response snapshot for the audit trail. Never holds secrets.
    pub metadata: Value,
}

/// The provider's view of a payment after capture or retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    /// Amount actually captured, when the provider reports one.
    pub amount: Option<Money>,
    pub provider_status: String,
    /// Whether the money has moved.
    pub completed: bool,
    pub metadata: Value,
}

/// A payment network behind a uniform interface.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Creates the external payable (intent, order) for an internal order.
    async fn create_payable(&self, order: &PayableOrder) -> PaymentResult<Payable>;

    /// Captures (PayPal) or retrieves (Stripe) the payment for `external_id`.
    async fn capture(&self, external_id: &str) -> PaymentResult<Capture>;

    /// Whether the return-to-site flow must call `capture` to move money.
    fn requires_capture(&self) -> bool;
}

// =============================================================================
// Shared HTTP helpers
// =============================================================================

/// Reads a provider response as JSON, turning non-2xx into
/// `PaymentError::Provider` with the provider's own message.
pub(crate) async fn read_json(response: reqwest::Response) -> PaymentResult<Value> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let (code, message) = provider_error_detail(&body);
        return Err(PaymentError::Provider {
            status: status.as_u16(),
            code,
            message: message.unwrap_or_else(|| status.to_string()),
        });
    }

    Ok(serde_json::from_str(&text)?)
}

/// Extracts `(code, message)` from a Stripe or PayPal error body.
fn provider_error_detail(body: &Value) -> (Option<String>, Option<String>) {
    // Stripe: {"error": {"code": "...", "message": "..."}}
    if let Some(error) = body.get("error").filter(|e| e.is_object()) {
        return (
            error.get("code").and_then(Value::as_str).map(str::to_string),
            error.get("message").and_then(Value::as_str).map(str::to_string),
        );
    }

    // PayPal: {"name": "...", "message": "...", "details": [{"issue": "..."}]}
    let code = body
        .pointer("/details/0/issue")
        .or_else(|| body.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let message = body.get("message").and_then(Value::as_str).map(str::to_string);
    (code, message)
}
