//! # Stripe Gateway
//!
//! PaymentIntents with automatic capture. The storefront confirms the
//! intent client-side with the returned client secret; money moves without
//! a server-side capture call, so `capture` only retrieves the intent.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::PaymentResult;
use crate::gateway::{read_json, Capture, Payable, PayableOrder, PaymentGateway};
use crate::PROVIDER_TIMEOUT_SECS;
use checkstand_core::{Money, PaymentProvider};

pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret key (`sk_live_...` / `sk_test_...`).
    pub api_key: String,
    pub api_base: String,
    /// ISO 4217, lowercase.
    pub currency: String,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        StripeConfig {
            api_key: api_key.into(),
            api_base: STRIPE_API_BASE.to_string(),
            currency: "usd".to_string(),
        }
    }
}

/// The slice of a PaymentIntent we read.
#[derive(Debug, Clone, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
    amount: i64,
    #[serde(default)]
    amount_received: Option<i64>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    currency: Option<String>,
}

impl PaymentIntent {
    fn snapshot(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "status": self.status,
            "amount": self.amount,
            "amount_received": self.amount_received,
            "currency": self.currency,
        })
    }

    fn to_capture(&self) -> Capture {
        Capture {
            amount: self.amount_received.map(Money::from_cents),
            provider_status: self.status.clone(),
            completed: self.status == "succeeded",
            metadata: self.snapshot(),
        }
    }
}

pub struct StripeGateway {
    config: StripeConfig,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> PaymentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()?;

        Ok(StripeGateway { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    async fn create_payable(&self, order: &PayableOrder) -> PaymentResult<Payable> {
        let params = [
            ("amount", order.total.cents().to_string()),
            ("currency", self.config.currency.clone()),
            ("metadata[order_number]", order.order_number.clone()),
            ("metadata[order_id]", order.order_id.clone()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        debug!(order_number = %order.order_number, amount = %order.total, "Creating Stripe PaymentIntent");

        let response = self
            .client
            .post(self.url("/v1/payment_intents"))
            .basic_auth(&self.config.api_key, Some(""))
            .header("Idempotency-Key", order.idempotency_key())
            .form(&params)
            .send()
            .await?;

        let body = read_json(response).await?;
        let intent: PaymentIntent = serde_json::from_value(body)?;

        info!(
            order_number = %order.order_number,
            payment_intent = %intent.id,
            status = %intent.status,
            "Stripe PaymentIntent created"
        );

        Ok(Payable {
            metadata: intent.snapshot(),
            external_id: intent.id,
            redirect_url: None,
            client_secret: intent.client_secret,
            provider_status: intent.status,
        })
    }

    async fn capture(&self, external_id: &str) -> PaymentResult<Capture> {
        let response = self
            .client
            .get(self.url(&format!("/v1/payment_intents/{}", external_id)))
            .basic_auth(&self.config.api_key, Some(""))
            .send()
            .await?;

        let body = read_json(response).await?;
        let intent: PaymentIntent = serde_json::from_value(body)?;

        debug!(payment_intent = %intent.id, status = %intent.status, "Retrieved Stripe PaymentIntent");

        Ok(intent.to_capture())
    }

    fn requires_capture(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(status: &str, received: Option<i64>) -> PaymentIntent {
        serde_json::from_value(json!({
            "id": "pi_123",
            "object": "payment_intent",
            "status": status,
            "amount": 3159,
            "amount_received": received,
            "client_secret": "pi_123_secret_abc",
            "currency": "usd"
        }))
        .unwrap()
    }

    #[test]
    fn test_succeeded_intent_is_completed_capture() {
        let capture = intent("succeeded", Some(3159)).to_capture();

        assert!(capture.completed);
        assert_eq!(capture.amount, Some(Money::from_cents(3159)));
        assert_eq!(capture.provider_status, "succeeded");
    }

    #[test]
    fn test_pending_intent_is_not_completed() {
        let capture = intent("requires_payment_method", Some(0)).to_capture();
        assert!(!capture.completed);
    }

    #[test]
    fn test_snapshot_never_contains_client_secret() {
        let snapshot = intent("requires_payment_method", None).snapshot();
        assert!(snapshot.get("client_secret").is_none());
        assert_eq!(snapshot["id"], "pi_123");
    }

    #[test]
    fn test_url_joins_custom_base() {
        let gateway = StripeGateway::new(StripeConfig {
            api_base: "http://localhost:12111/".into(),
            ..StripeConfig::new("sk_test_123")
        })
        .unwrap();

        assert_eq!(
            gateway.url("/v1/payment_intents"),
            "http://localhost:12111/v1/payment_intents"
        );
    }
}
