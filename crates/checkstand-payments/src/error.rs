//! # Payment Error Types
//!
//! Everything that can go wrong talking to a provider.
//!
//! The service layer turns all of these into a 502 for the storefront:
//! the customer cannot fix a provider outage, and provider messages are
//! logged rather than echoed back.

use thiserror::Error;

/// Result type for payment operations.
pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// Transport failure: DNS, TLS, timeout, connection reset.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    ///
    /// `code` carries the provider's machine-readable error (Stripe
    /// `error.code`, PayPal `details[0].issue`) when present.
    #[error("Provider error ({status}): {message}")]
    Provider {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The provider answered 2xx with a body we could not interpret.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Missing or malformed gateway configuration.
    #[error("Gateway configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// True when the provider rejected the call with this error code.
    pub fn has_code(&self, expected: &str) -> bool {
        matches!(self, PaymentError::Provider { code: Some(code), .. } if code == expected)
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_code() {
        let err = PaymentError::Provider {
            status: 422,
            code: Some("ORDER_ALREADY_CAPTURED".into()),
            message: "Order already captured".into(),
        };

        assert!(err.has_code("ORDER_ALREADY_CAPTURED"));
        assert!(!err.has_code("INSTRUMENT_DECLINED"));
        assert!(!PaymentError::Config("missing key".into()).has_code("ORDER_ALREADY_CAPTURED"));
    }
}
