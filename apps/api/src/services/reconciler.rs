//! # Webhook Event Reconciler
//!
//! Applies provider events to orders at most once per event id, no matter
//! how often or in which order providers deliver them.
//!
//! ## Per-delivery Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. verify signature          false ──► 400 InvalidSignature            │
//! │  2. parse event               error ──► 400 InvalidPayload              │
//! │  3. claim (provider, id)      AlreadyProcessed ──► 200, nothing applied │
//! │                               InFlight ─────────► 503, redeliver later  │
//! │  4. resolve order             unknown ──► release claim, 400            │
//! │  5. plan + CAS write          regression ──► no-op                      │
//! │                               capture after cancel ──► anomaly          │
//! │                               CAS lost ──► re-read, re-plan             │
//! │  6. mark processed            only after step 5 committed               │
//! │                                                                         │
//! │  Any failure between 3 and 6 releases the claim so the next            │
//! │  delivery retries instead of waiting out the lease.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The return-to-site flow ([`super::payments::confirm_return`]) shares
//! [`apply_outcome`], so the two paths race safely: whichever commits
//! first wins and the other sees the order already in the target state.

use axum::http::HeaderMap;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::MAX_CAS_ATTEMPTS;
use crate::error::{ServiceError, ServiceResult};
use crate::state::AppState;
use checkstand_core::lifecycle::plan_payment_transition;
use checkstand_core::{
    CoreError, Money, Order, PaymentOutcome, PaymentProvider, PaymentStatus, PaymentTransition,
};
use checkstand_db::{ClaimOutcome, PaymentWrite};
use checkstand_payments::{parse_event, ProviderEvent};

/// What a delivery did. Every variant is a 2xx for the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The order moved.
    Applied,
    /// The order already held the target state, or the event would have
    /// regressed it.
    NoOp,
    /// This event id was processed by an earlier delivery.
    Duplicate,
    /// Event type with no order side effect.
    Ignored,
    /// Captured amount disagreed with the order total, or money arrived for
    /// a cancelled order. Recorded under `payment_metadata.anomalies`.
    Anomaly,
    /// Less than the order total was refunded; noted, order stays paid.
    PartialRefund,
}

/// Handles one webhook delivery end to end.
pub async fn handle_webhook(
    state: &AppState,
    provider: PaymentProvider,
    body: &[u8],
    headers: &HeaderMap,
) -> ServiceResult<ReconcileOutcome> {
    let Some(verifier) = state.verifier(provider) else {
        error!(provider = %provider, "Webhook received for a provider that is not configured");
        return Err(ServiceError::InvalidSignature);
    };

    if !verifier.verify(body, headers).await? {
        warn!(provider = %provider, bytes = body.len(), "Webhook signature rejected");
        return Err(ServiceError::InvalidSignature);
    }

    let event = parse_event(provider, body).map_err(|err| {
        warn!(provider = %provider, error = %err, "Unparseable webhook payload");
        ServiceError::InvalidPayload(err.to_string())
    })?;

    let ledger = state.db.webhook_events();
    let payload = String::from_utf8_lossy(body);

    match ledger
        .claim(provider, &event.event_id, &event.event_type, &payload, state.claim_lease)
        .await?
    {
        ClaimOutcome::Claimed { attempts } => {
            debug!(provider = %provider, event_id = %event.event_id, attempts, "Webhook event claimed");
        }
        ClaimOutcome::AlreadyProcessed => {
            info!(provider = %provider, event_id = %event.event_id, "Duplicate webhook delivery");
            return Ok(ReconcileOutcome::Duplicate);
        }
        ClaimOutcome::InFlight => {
            return Err(ServiceError::EventInFlight(event.event_id));
        }
    }

    match process(state, &event).await {
        Ok(outcome) => {
            ledger.mark_processed(provider, &event.event_id).await?;
            info!(
                provider = %provider,
                event_id = %event.event_id,
                event_type = %event.event_type,
                ?outcome,
                "Webhook event processed"
            );
            Ok(outcome)
        }
        Err(err) => {
            if let Err(release_err) = ledger.release(provider, &event.event_id, &err.to_string()).await {
                // The lease expiry frees it eventually
                error!(event_id = %event.event_id, error = %release_err, "Failed to release webhook claim");
            }
            Err(err)
        }
    }
}

async fn process(state: &AppState, event: &ProviderEvent) -> ServiceResult<ReconcileOutcome> {
    let Some(outcome) = event.kind.outcome() else {
        debug!(event_type = %event.event_type, "Webhook event has no order side effect");
        return Ok(ReconcileOutcome::Ignored);
    };

    let order = resolve_order(state, event).await?;

    let audit = json!({
        "event_id": event.event_id,
        "event_type": event.event_type,
        "provider": event.provider,
        "source": "webhook",
    });

    apply_outcome(state, order, outcome, event.amount, audit).await
}

/// Finds the order an event is about: our order number first, then the
/// stored provider correlation id.
async fn resolve_order(state: &AppState, event: &ProviderEvent) -> ServiceResult<Order> {
    let orders = state.db.orders();

    if let Some(order_number) = &event.order_number {
        if let Some(order) = orders.find_by_order_number(order_number).await? {
            return Ok(order);
        }
    }

    if let Some(external_id) = &event.external_id {
        if let Some(order) = orders.find_by_correlation(event.provider, external_id).await? {
            return Ok(order);
        }
    }

    let reference = event
        .order_number
        .clone()
        .or_else(|| event.external_id.clone())
        .unwrap_or_else(|| "<none>".to_string());

    error!(
        provider = %event.provider,
        event_id = %event.event_id,
        event_type = %event.event_type,
        reference = %reference,
        "Webhook event does not match any order"
    );
    Err(ServiceError::UnresolvedCorrelation(reference))
}

/// Drives an order toward the state a payment outcome implies.
///
/// Plans against the order as read, writes with a compare-and-swap on
/// that state, and re-plans from a fresh read when another writer got
/// there first. `audit` is appended to `payment_metadata.events`.
pub(crate) async fn apply_outcome(
    state: &AppState,
    mut order: Order,
    outcome: PaymentOutcome,
    amount: Option<Money>,
    audit: Value,
) -> ServiceResult<ReconcileOutcome> {
    let orders = state.db.orders();

    if outcome == PaymentOutcome::Captured {
        if let Some(amount) = amount.filter(|a| *a != order.total()) {
            error!(
                order_number = %order.order_number,
                expected = %order.total(),
                received = %amount,
                "Captured amount does not match order total"
            );
            let mut anomaly = audit;
            anomaly["kind"] = json!("amount_mismatch");
            anomaly["expected_cents"] = json!(order.total_cents);
            anomaly["received_cents"] = json!(amount.cents());
            anomaly["recorded_at"] = json!(Utc::now());
            orders.record_anomaly(&order.id, &anomaly).await?;
            return Ok(ReconcileOutcome::Anomaly);
        }
    }

    // Refund amounts are running totals, so the last partial refund that
    // reaches the order total falls through to the full transition
    if outcome == PaymentOutcome::Refunded && order.payment_status == PaymentStatus::Paid {
        if let Some(refunded) = amount.filter(|a| *a < order.total()) {
            info!(
                order_number = %order.order_number,
                refunded = %refunded,
                total = %order.total(),
                "Partial refund recorded, order stays paid"
            );
            let mut note = audit;
            note["refunded_cents"] = json!(refunded.cents());
            note["total_cents"] = json!(order.total_cents);
            note["recorded_at"] = json!(Utc::now());
            orders.record_partial_refund(&order.id, &note).await?;
            return Ok(ReconcileOutcome::PartialRefund);
        }
    }

    for _ in 0..MAX_CAS_ATTEMPTS {
        let (status, payment_status, anomaly) = match plan_payment_transition(order.status, order.payment_status, outcome) {
            Ok(PaymentTransition::NoOp) => {
                debug!(order_number = %order.order_number, %outcome, "Order already in target payment state");
                return Ok(ReconcileOutcome::NoOp);
            }
            Ok(PaymentTransition::Apply { status, payment_status }) => (status, payment_status, None),
            Ok(PaymentTransition::RefundRequired { payment_status }) => {
                let mut anomaly = audit.clone();
                anomaly["kind"] = json!("captured_after_cancel");
                anomaly["refund_required"] = json!(true);
                anomaly["amount_cents"] = json!(amount.unwrap_or_else(|| order.total()).cents());
                anomaly["recorded_at"] = json!(Utc::now());
                (order.status, payment_status, Some(anomaly))
            }
            Err(CoreError::InvalidTransition { from, to, .. }) => {
                warn!(
                    order_number = %order.order_number,
                    %outcome,
                    from = %from,
                    to = %to,
                    "Ignoring payment event that would regress the order"
                );
                return Ok(ReconcileOutcome::NoOp);
            }
            Err(other) => return Err(other.into()),
        };

        let mut event = audit.clone();
        event["outcome"] = json!(outcome.to_string());
        event["applied_at"] = json!(Utc::now());

        let flagged = anomaly.is_some();
        let write = PaymentWrite {
            from_status: order.status,
            from_payment_status: order.payment_status,
            status,
            payment_status,
            event,
            anomaly,
        };

        if orders.apply_payment_transition(&order.id, &write).await? {
            if flagged {
                error!(
                    order_number = %order.order_number,
                    %outcome,
                    "Payment captured for a cancelled order, refund required"
                );
                return Ok(ReconcileOutcome::Anomaly);
            }
            info!(
                order_number = %order.order_number,
                %outcome,
                status = %status,
                payment_status = %payment_status,
                "Order payment state updated"
            );
            return Ok(ReconcileOutcome::Applied);
        }

        debug!(order_number = %order.order_number, "Order changed concurrently, re-planning");
        order = orders
            .get(&order.id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {}", order.id)))?;
    }

    Err(ServiceError::TransientStorage(format!(
        "order {} kept changing during payment update",
        order.order_number
    )))
}
