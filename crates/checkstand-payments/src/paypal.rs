//! # PayPal Gateway
//!
//! Orders v2 with `intent=CAPTURE`.
//!
//! ```text
//! create_payable ──► POST /v2/checkout/orders ──► approve link
//!                                                    │
//!                          customer approves at PayPal, returns to site
//!                                                    │
//! capture ─────────► POST /v2/checkout/orders/{id}/capture
//!                        │
//!                        └─ 422 ORDER_ALREADY_CAPTURED ──► GET order
//! ```
//!
//! Every call carries an OAuth2 bearer token from the client-credentials
//! grant. The token is cached until shortly before it expires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{PaymentError, PaymentResult};
use crate::gateway::{read_json, Capture, Payable, PayableOrder, PaymentGateway};
use crate::PROVIDER_TIMEOUT_SECS;
use checkstand_core::{Money, PaymentProvider};

pub const PAYPAL_API_BASE: &str = "https://api-m.paypal.com";

/// Refresh this long before the provider-reported expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Id of the webhook registration, needed for signature verification.
    pub webhook_id: String,
    pub api_base: String,
    /// ISO 4217, uppercase.
    pub currency: String,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

impl PaypalConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        PaypalConfig {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            webhook_id: String::new(),
            api_base: PAYPAL_API_BASE.to_string(),
            currency: "USD".to_string(),
            return_url: None,
            cancel_url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct PaypalGateway {
    config: PaypalConfig,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl PaypalGateway {
    pub fn new(config: PaypalConfig) -> PaymentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()?;

        Ok(PaypalGateway {
            config,
            client,
            token: Mutex::new(None),
        })
    }

    pub fn webhook_id(&self) -> &str {
        &self.config.webhook_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Returns a bearer token, fetching a new one when the cached token is
    /// missing or about to expire.
    async fn access_token(&self) -> PaymentResult<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting PayPal access token");

        let response = self
            .client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let body = read_json(response).await?;
        let token: TokenResponse = serde_json::from_value(body)?;

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });

        Ok(value)
    }

    async fn get_order(&self, order_id: &str) -> PaymentResult<Value> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.url(&format!("/v2/checkout/orders/{}", order_id)))
            .bearer_auth(token)
            .send()
            .await?;

        read_json(response).await
    }

    /// Asks PayPal whether a webhook delivery is authentic.
    ///
    /// Missing transmission headers or a non-JSON body are simply not
    /// authentic; only transport and provider failures are errors.
    pub async fn verify_webhook_signature(&self, headers: &HeaderMap, body: &[u8]) -> PaymentResult<bool> {
        if self.config.webhook_id.is_empty() {
            return Err(PaymentError::Config("paypal webhook_id is not set".into()));
        }

        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

        let (Some(transmission_id), Some(transmission_time), Some(transmission_sig), Some(cert_url), Some(auth_algo)) = (
            header("paypal-transmission-id"),
            header("paypal-transmission-time"),
            header("paypal-transmission-sig"),
            header("paypal-cert-url"),
            header("paypal-auth-algo"),
        ) else {
            return Ok(false);
        };

        let Ok(webhook_event) = serde_json::from_slice::<Value>(body) else {
            return Ok(false);
        };

        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url("/v1/notifications/verify-webhook-signature"))
            .bearer_auth(token)
            .json(&json!({
                "auth_algo": auth_algo,
                "cert_url": cert_url,
                "transmission_id": transmission_id,
                "transmission_sig": transmission_sig,
                "transmission_time": transmission_time,
                "webhook_id": self.config.webhook_id,
                "webhook_event": webhook_event,
            }))
            .send()
            .await?;

        let result = read_json(response).await?;
        Ok(result.get("verification_status").and_then(Value::as_str) == Some("SUCCESS"))
    }
}

#[async_trait]
impl PaymentGateway for PaypalGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Paypal
    }

    async fn create_payable(&self, order: &PayableOrder) -> PaymentResult<Payable> {
        let token = self.access_token().await?;

        debug!(order_number = %order.order_number, amount = %order.total, "Creating PayPal order");

        let response = self
            .client
            .post(self.url("/v2/checkout/orders"))
            .bearer_auth(token)
            .header("PayPal-Request-Id", order.idempotency_key())
            .json(&order_request(order, &self.config))
            .send()
            .await?;

        let body = read_json(response).await?;

        let external_id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| PaymentError::InvalidResponse("PayPal order without id".into()))?
            .to_string();
        let provider_status = body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        info!(
            order_number = %order.order_number,
            paypal_order = %external_id,
            status = %provider_status,
            "PayPal order created"
        );

        Ok(Payable {
            redirect_url: approve_link(&body),
            client_secret: None,
            metadata: json!({ "id": external_id, "status": provider_status }),
            external_id,
            provider_status,
        })
    }

    async fn capture(&self, external_id: &str) -> PaymentResult<Capture> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(self.url(&format!("/v2/checkout/orders/{}/capture", external_id)))
            .bearer_auth(token)
            .header("PayPal-Request-Id", format!("capture-{}", external_id))
            .json(&json!({}))
            .send()
            .await?;

        let body = match read_json(response).await {
            Ok(body) => body,
            // The webhook or an earlier return already captured it
            Err(err) if err.has_code("ORDER_ALREADY_CAPTURED") => {
                warn!(paypal_order = %external_id, "PayPal order already captured, fetching state");
                self.get_order(external_id).await?
            }
            Err(err) => return Err(err),
        };

        let capture = capture_from_order(&body)?;
        info!(
            paypal_order = %external_id,
            status = %capture.provider_status,
            completed = capture.completed,
            "PayPal capture"
        );

        Ok(capture)
    }

    fn requires_capture(&self) -> bool {
        true
    }
}

// =============================================================================
// Wire helpers
// =============================================================================

fn order_request(order: &PayableOrder, config: &PaypalConfig) -> Value {
    let mut request = json!({
        "intent": "CAPTURE",
        "purchase_units": [{
            "reference_id": order.order_number,
            "custom_id": order.order_number,
            "amount": {
                "currency_code": config.currency,
                "value": order.total.to_decimal_string(),
            },
        }],
    });

    if let Some(return_url) = &config.return_url {
        request["application_context"] = json!({
            "return_url": return_url,
            "cancel_url": config.cancel_url.as_deref().unwrap_or(return_url),
        });
    }

    request
}

fn approve_link(order: &Value) -> Option<String> {
    order
        .get("links")?
        .as_array()?
        .iter()
        .find(|link| matches!(link.get("rel").and_then(Value::as_str), Some("approve" | "payer-action")))
        .and_then(|link| link.get("href"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Reads the first capture out of an order (capture response or GET).
fn capture_from_order(order: &Value) -> PaymentResult<Capture> {
    let order_status = order
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| PaymentError::InvalidResponse("PayPal order without status".into()))?;

    let capture = order.pointer("/purchase_units/0/payments/captures/0");

    let capture_status = capture
        .and_then(|c| c.get("status"))
        .and_then(Value::as_str)
        .unwrap_or(order_status);

    let amount = capture
        .and_then(|c| c.pointer("/amount/value"))
        .and_then(Value::as_str)
        .and_then(Money::from_decimal_str);

    Ok(Capture {
        amount,
        provider_status: capture_status.to_string(),
        completed: capture_status == "COMPLETED",
        metadata: json!({
            "id": order.get("id"),
            "status": order_status,
            "capture_id": capture.and_then(|c| c.get("id")),
            "capture_status": capture_status,
        }),
    })
}
