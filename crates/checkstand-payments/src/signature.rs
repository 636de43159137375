//! # Webhook Signature Verification
//!
//! `verify(body, headers) -> bool`. A `false` is final; callers answer 400
//! without saying which check failed. `Err` means the verifier itself could
//! not run (PayPal API unreachable) and the delivery should be retried.
//!
//! ## Stripe
//! ```text
//! Stripe-Signature: t=1700000000,v1=5257a869...,v1=...
//!
//! expected = hex(HMAC-SHA256(secret, "{t}.{raw body}"))
//! accept iff |now - t| <= tolerance AND any v1 == expected (constant time)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use sha2::Sha256;
use tracing::debug;

use crate::error::PaymentResult;
use crate::paypal::PaypalGateway;

type HmacSha256 = Hmac<Sha256>;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Default replay window for Stripe timestamps.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(&self, body: &[u8], headers: &HeaderMap) -> PaymentResult<bool>;
}

// =============================================================================
// Stripe
// =============================================================================

pub struct StripeSignatureVerifier {
    secret: String,
    tolerance: Duration,
}

impl StripeSignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        StripeSignatureVerifier {
            secret: secret.into(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Verifies a `Stripe-Signature` header value against `body` as of
    /// `now` (unix seconds).
    pub fn verify_at(&self, body: &[u8], header: &str, now: i64) -> bool {
        let mut timestamp = None;
        let mut candidates = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let Some(timestamp) = timestamp else {
            return false;
        };

        if now.abs_diff(timestamp) > self.tolerance.as_secs() {
            debug!(timestamp, now, "Stripe signature outside tolerance");
            return false;
        }

        let expected = self.sign(timestamp, body);
        candidates.iter().any(|candidate| constant_time_eq(&expected, candidate))
    }

    /// `hex(HMAC-SHA256(secret, "{t}.{body}"))`
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> String {
        // HMAC accepts keys of any length
        let mut mac = match HmacSha256::new_from_slice(self.secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl SignatureVerifier for StripeSignatureVerifier {
    async fn verify(&self, body: &[u8], headers: &HeaderMap) -> PaymentResult<bool> {
        let Some(header) = headers
            .get(STRIPE_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(false);
        };

        Ok(self.verify_at(body, header, chrono::Utc::now().timestamp()))
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// =============================================================================
// PayPal
// =============================================================================

/// Delegates to PayPal's verify-webhook-signature API.
pub struct PaypalSignatureVerifier {
    gateway: Arc<PaypalGateway>,
}

impl PaypalSignatureVerifier {
    pub fn new(gateway: Arc<PaypalGateway>) -> Self {
        PaypalSignatureVerifier { gateway }
    }
}

#[async_trait]
impl SignatureVerifier for PaypalSignatureVerifier {
    async fn verify(&self, body: &[u8], headers: &HeaderMap) -> PaymentResult<bool> {
        self.gateway.verify_webhook_signature(headers, body).await
    }
}
