//! Payment initiation and the return-to-site confirmation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::reconciler::{apply_outcome, ReconcileOutcome};
use crate::error::{ServiceError, ServiceResult};
use crate::state::AppState;
use checkstand_core::{
    CoreError, Order, OrderDetails, OrderStatus, PaymentOutcome, PaymentProvider, ValidationError,
};
use checkstand_db::DbError;
use checkstand_payments::PayableOrder;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub provider: PaymentProvider,
}

/// What the storefront needs to hand the shopper to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
    pub order: Order,
    pub provider: PaymentProvider,
    pub external_id: String,
    /// PayPal approval link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    /// Stripe client secret for the payment element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub provider_status: String,
}

/// Opens a payment with `provider` for a pending order.
///
/// Repeating the call is safe: the provider request carries an idempotency
/// key derived from the order number, and attaching the correlation id is
/// itself idempotent.
pub async fn create_payable(
    state: &AppState,
    owner_id: &str,
    order_id: &str,
    provider: PaymentProvider,
) -> ServiceResult<PaymentSession> {
    let details = state
        .db
        .orders()
        .get_for_owner(owner_id, order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {}", order_id)))?;
    let order = details.order;

    ensure_payable(&order)?;

    let gateway = state.gateway(provider)?;
    let payable = gateway.create_payable(&PayableOrder::from_order(&order)).await?;

    debug!(
        order_number = %order.order_number,
        provider = %provider,
        external_id = %payable.external_id,
        provider_status = %payable.provider_status,
        "Provider payment created"
    );

    let order = match state
        .db
        .orders()
        .attach_correlation(&order.id, provider, &payable.external_id, &payable.metadata)
        .await
    {
        Ok(order) => order,
        Err(DbError::StaleState { .. }) => {
            // Paid or progressed while we were talking to the provider
            let current = reload(state, &order.id).await?;
            warn!(order_number = %current.order_number, status = %current.status, "Order left pending during payment creation");
            ensure_payable(&current)?;
            return Err(ServiceError::TransientStorage(format!(
                "order {} changed while attaching payment",
                current.order_number
            )));
        }
        Err(err) => return Err(err.into()),
    };

    info!(order_number = %order.order_number, provider = %provider, "Payment session opened");

    Ok(PaymentSession {
        provider,
        external_id: payable.external_id,
        redirect_url: payable.redirect_url,
        client_secret: payable.client_secret,
        provider_status: payable.provider_status,
        order,
    })
}

/// Confirms a payment after the shopper comes back from the provider.
///
/// Captures (PayPal) or looks up (Stripe) the provider payment and, when
/// the provider reports it complete, applies the same guarded transition a
/// webhook would. Whichever of the two lands second is a no-op.
pub async fn confirm_return(state: &AppState, owner_id: &str, order_id: &str) -> ServiceResult<OrderDetails> {
    let details = state
        .db
        .orders()
        .get_for_owner(owner_id, order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {}", order_id)))?;

    if details.order.payment_status.is_settled() {
        debug!(order_number = %details.order.order_number, "Return on a settled order");
        return Ok(details);
    }

    let (provider, external_id) = match (details.order.payment_provider, details.order.external_payment_id()) {
        (Some(provider), Some(external_id)) => (provider, external_id.to_string()),
        _ => {
            return Err(ServiceError::Validation(ValidationError::InvalidFormat {
                field: "order".to_string(),
                reason: "no payment has been started for this order".to_string(),
            }))
        }
    };

    let gateway = state.gateway(provider)?;
    let capture = gateway.capture(&external_id).await?;

    if capture.completed {
        let audit = json!({
            "event_id": format!("return:{}", external_id),
            "event_type": "return_confirmation",
            "provider": provider,
            "source": "return",
            "provider_status": capture.provider_status,
            "captured_at": Utc::now(),
        });

        let outcome = apply_outcome(
            state,
            details.order.clone(),
            PaymentOutcome::Captured,
            capture.amount,
            audit,
        )
        .await?;

        if outcome == ReconcileOutcome::Applied {
            info!(order_number = %details.order.order_number, provider = %provider, "Payment confirmed on return");
        }
    } else {
        info!(
            order_number = %details.order.order_number,
            provider = %provider,
            provider_status = %capture.provider_status,
            "Payment not complete yet, waiting for webhook"
        );
    }

    state
        .db
        .orders()
        .get_for_owner(owner_id, order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {}", order_id)))
}

fn ensure_payable(order: &Order) -> ServiceResult<()> {
    if order.payment_status.is_settled() {
        return Err(CoreError::AlreadyPaid {
            order_number: order.order_number.clone(),
        }
        .into());
    }

    if order.status != OrderStatus::Pending {
        return Err(CoreError::invalid_transition("status", order.status, OrderStatus::Pending).into());
    }

    Ok(())
}

async fn reload(state: &AppState, order_id: &str) -> ServiceResult<Order> {
    state
        .db
        .orders()
        .get(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {}", order_id)))
}
