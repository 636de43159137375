//! # Provider Event Normalisation
//!
//! Turns a verified webhook body into a [`ProviderEvent`] the reconciler
//! can act on without knowing which provider sent it.
//!
//! | Provider | Event type                                   | Kind     |
//! |----------|----------------------------------------------|----------|
//! | Stripe   | `payment_intent.succeeded`                   | Captured |
//! | Stripe   | `payment_intent.payment_failed` / `.canceled`| Denied   |
//! | Stripe   | `charge.refunded`                            | Refunded |
//! | PayPal   | `PAYMENT.CAPTURE.COMPLETED`                  | Captured |
//! | PayPal   | `PAYMENT.CAPTURE.DENIED` / `.DECLINED`       | Denied   |
//! | PayPal   | `PAYMENT.CAPTURE.REFUNDED`                   | Refunded |
//!
//! Anything else is `Ignored`: recorded in the ledger, no side effect.
//!
//! For refunds, `amount` is the cumulative amount refunded so far, so a
//! partial refund can be told apart from a full one.

use serde_json::Value;

use crate::error::{PaymentError, PaymentResult};
use checkstand_core::{Money, PaymentOutcome, PaymentProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
    Captured,
    Denied,
    Refunded,
    Ignored,
}

impl PaymentEventKind {
    /// The lifecycle outcome this event reports, if any.
    pub fn outcome(self) -> Option<PaymentOutcome> {
        match self {
            PaymentEventKind::Captured => Some(PaymentOutcome::Captured),
            PaymentEventKind::Denied => Some(PaymentOutcome::Denied),
            PaymentEventKind::Refunded => Some(PaymentOutcome::Refunded),
            PaymentEventKind::Ignored => None,
        }
    }
}

/// A webhook event in provider-neutral form.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEvent {
    pub provider: PaymentProvider,
    /// Provider-assigned event id; the ledger dedup key.
    pub event_id: String,
    pub event_type: String,
    pub kind: PaymentEventKind,
    /// Our order number, echoed back through provider metadata.
    pub order_number: Option<String>,
    /// PaymentIntent id (Stripe) or PayPal order id.
    pub external_id: Option<String>,
    /// Amount the event reports as captured or refunded.
    pub amount: Option<Money>,
    pub raw: Value,
}

/// Parses a webhook body from `provider`.
pub fn parse_event(provider: PaymentProvider, body: &[u8]) -> PaymentResult<ProviderEvent> {
    let raw: Value = serde_json::from_slice(body)?;
    match provider {
        PaymentProvider::Stripe => parse_stripe_event(raw),
        PaymentProvider::Paypal => parse_paypal_event(raw),
    }
}

fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

fn required(value: &Value, pointer: &str) -> PaymentResult<String> {
    str_at(value, pointer)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PaymentError::InvalidResponse(format!("event is missing {}", pointer)))
}

/// `{"id": "evt_..", "type": "..", "data": {"object": {..}}}`
pub fn parse_stripe_event(raw: Value) -> PaymentResult<ProviderEvent> {
    let event_id = required(&raw, "/id")?;
    let event_type = required(&raw, "/type")?;

    let kind = match event_type.as_str() {
        "payment_intent.succeeded" => PaymentEventKind::Captured,
        "payment_intent.payment_failed" | "payment_intent.canceled" => PaymentEventKind::Denied,
        "charge.refunded" => PaymentEventKind::Refunded,
        _ => PaymentEventKind::Ignored,
    };

    let object = raw.pointer("/data/object").cloned().unwrap_or(Value::Null);

    // A charge points at its intent; an intent is its own correlation id
    let external_id = if event_type.starts_with("charge.") {
        str_at(&object, "/payment_intent")
    } else {
        str_at(&object, "/id")
    };

    let amount_field = match kind {
        PaymentEventKind::Refunded => "/amount_refunded",
        _ => "/amount_received",
    };
    let amount = object.pointer(amount_field).and_then(Value::as_i64).map(Money::from_cents);

    Ok(ProviderEvent {
        provider: PaymentProvider::Stripe,
        event_id,
        event_type,
        kind,
        order_number: str_at(&object, "/metadata/order_number"),
        external_id,
        amount,
        raw,
    })
}

/// `{"id": "WH-..", "event_type": "..", "resource": {..}}`
pub fn parse_paypal_event(raw: Value) -> PaymentResult<ProviderEvent> {
    let event_id = required(&raw, "/id")?;
    let event_type = required(&raw, "/event_type")?;

    let kind = match event_type.as_str() {
        "PAYMENT.CAPTURE.COMPLETED" => PaymentEventKind::Captured,
        "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => PaymentEventKind::Denied,
        "PAYMENT.CAPTURE.REFUNDED" => PaymentEventKind::Refunded,
        _ => PaymentEventKind::Ignored,
    };

    let resource = raw.get("resource").cloned().unwrap_or(Value::Null);

    let decimal_at = |pointer: &str| {
        resource
            .pointer(pointer)
            .and_then(Value::as_str)
            .and_then(Money::from_decimal_str)
    };
    // A refund resource carries this refund's amount; the running total
    // is what says whether the capture is fully refunded
    let amount = match kind {
        PaymentEventKind::Refunded => decimal_at("/seller_payable_breakdown/total_refunded_amount/value")
            .or_else(|| decimal_at("/amount/value")),
        _ => decimal_at("/amount/value"),
    };

    Ok(ProviderEvent {
        provider: PaymentProvider::Paypal,
        event_id,
        event_type,
        kind,
        order_number: str_at(&resource, "/custom_id").or_else(|| str_at(&resource, "/invoice_id")),
        external_id: str_at(&resource, "/supplementary_data/related_ids/order_id"),
        amount,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bytes(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_stripe_succeeded() {
        let body = bytes(json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {
                "id": "pi_123",
                "object": "payment_intent",
                "amount": 3159,
                "amount_received": 3159,
                "metadata": {"order_number": "ORD-20260101-ABC123", "order_id": "o-1"}
            }}
        }));

        let event = parse_event(PaymentProvider::Stripe, &body).unwrap();

        assert_eq!(event.event_id, "evt_1");
        assert_eq!(event.kind, PaymentEventKind::Captured);
        assert_eq!(event.order_number.as_deref(), Some("ORD-20260101-ABC123"));
        assert_eq!(event.external_id.as_deref(), Some("pi_123"));
        assert_eq!(event.amount, Some(Money::from_cents(3159)));
        assert_eq!(event.kind.outcome(), Some(PaymentOutcome::Captured));
    }

    #[test]
    fn test_stripe_refund_correlates_through_payment_intent() {
        let body = bytes(json!({
            "id": "evt_2",
            "type": "charge.refunded",
            "data": {"object": {
                "id": "ch_1",
                "payment_intent": "pi_123",
                "amount_refunded": 3159,
                "metadata": {}
            }}
        }));

        let event = parse_event(PaymentProvider::Stripe, &body).unwrap();

        assert_eq!(event.kind, PaymentEventKind::Refunded);
        assert_eq!(event.external_id.as_deref(), Some("pi_123"));
        assert_eq!(event.order_number, None);
        assert_eq!(event.amount, Some(Money::from_cents(3159)));
    }

    #[test]
    fn test_stripe_unknown_type_is_ignored() {
        let body = bytes(json!({"id": "evt_3", "type": "customer.created", "data": {"object": {}}}));
        let event = parse_event(PaymentProvider::Stripe, &body).unwrap();

        assert_eq!(event.kind, PaymentEventKind::Ignored);
        assert_eq!(event.kind.outcome(), None);
    }

    #[test]
    fn test_paypal_capture_completed() {
        let body = bytes(json!({
            "id": "WH-58D329510W468432D-8HN650336L201105X",
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {
                "id": "3C679366HH908993F",
                "status": "COMPLETED",
                "custom_id": "ORD-20260101-ABC123",
                "amount": {"currency_code": "USD", "value": "31.59"},
                "supplementary_data": {"related_ids": {"order_id": "5O190127TN364715T"}}
            }
        }));

        let event = parse_event(PaymentProvider::Paypal, &body).unwrap();

        assert_eq!(event.kind, PaymentEventKind::Captured);
        assert_eq!(event.order_number.as_deref(), Some("ORD-20260101-ABC123"));
        assert_eq!(event.external_id.as_deref(), Some("5O190127TN364715T"));
        assert_eq!(event.amount, Some(Money::from_cents(3159)));
    }

    #[test]
    fn test_paypal_declined_is_denied() {
        let body = bytes(json!({
            "id": "WH-1",
            "event_type": "PAYMENT.CAPTURE.DECLINED",
            "resource": {"custom_id": "ORD-20260101-ABC123"}
        }));

        assert_eq!(
            parse_event(PaymentProvider::Paypal, &body).unwrap().kind,
            PaymentEventKind::Denied
        );
    }

    #[test]
    fn test_paypal_refund_reports_running_total() {
        let body = bytes(json!({
            "id": "WH-REFUND-2",
            "event_type": "PAYMENT.CAPTURE.REFUNDED",
            "resource": {
                "id": "1JU08902781691411",
                "custom_id": "ORD-20260101-ABC123",
                "amount": {"currency_code": "USD", "value": "10.00"},
                "seller_payable_breakdown": {
                    "total_refunded_amount": {"currency_code": "USD", "value": "25.00"}
                }
            }
        }));

        let event = parse_event(PaymentProvider::Paypal, &body).unwrap();

        assert_eq!(event.kind, PaymentEventKind::Refunded);
        assert_eq!(event.amount, Some(Money::from_cents(2500)));
    }

    #[test]
    fn test_unparseable_payloads() {
        assert!(parse_event(PaymentProvider::Stripe, b"not json").is_err());
        assert!(parse_event(PaymentProvider::Stripe, &bytes(json!({"type": "x"}))).is_err());
        assert!(parse_event(PaymentProvider::Paypal, &bytes(json!({"id": "WH-1"}))).is_err());
    }
}
