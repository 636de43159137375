//! Order queries, cancellation and fulfillment steps.

use tracing::{debug, info};

use super::MAX_CAS_ATTEMPTS;
use crate::error::{ServiceError, ServiceResult};
use crate::state::AppState;
use checkstand_core::lifecycle::plan_status_transition;
use checkstand_core::{CoreError, Order, OrderDetails, OrderStatus, PaymentStatus};
use checkstand_db::DbError;

pub async fn get_order(state: &AppState, owner_id: &str, order_id: &str) -> ServiceResult<OrderDetails> {
    state
        .db
        .orders()
        .get_for_owner(owner_id, order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {}", order_id)))
}

/// The caller's orders, newest first.
pub async fn list_orders(state: &AppState, owner_id: &str) -> ServiceResult<Vec<OrderDetails>> {
    Ok(state.db.orders().list_for_owner(owner_id).await?)
}

/// Cancels an unpaid order and puts its stock back.
///
/// Paid orders go through a refund instead; a cancel here never touches money.
/// While a provider payment is open the order cannot be cancelled either,
/// since a capture could still land after the stock was released.
pub async fn cancel_order(state: &AppState, owner_id: &str, order_id: &str) -> ServiceResult<OrderDetails> {
    let mut order = get_order(state, owner_id, order_id).await?.order;

    for _ in 0..MAX_CAS_ATTEMPTS {
        ensure_cancellable(&order)?;

        match state
            .db
            .orders()
            .cancel(&order.id, order.status, order.payment_status)
            .await
        {
            Ok(cancelled) => {
                info!(order_number = %cancelled.order_number, owner_id, "Order cancelled by owner");
                return get_order(state, owner_id, order_id).await;
            }
            Err(DbError::StaleState { .. }) => {
                debug!(order_number = %order.order_number, "Order changed during cancel, re-checking");
                order = reload(state, &order.id).await?;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::TransientStorage(format!(
        "order {} kept changing during cancel",
        order.order_number
    )))
}

/// Moves a paid order through processing, shipping and delivery.
///
/// Operator-facing: not scoped to an owner.
pub async fn advance_fulfillment(state: &AppState, order_id: &str, next: OrderStatus) -> ServiceResult<Order> {
    if !matches!(
        next,
        OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
    ) {
        return Err(CoreError::invalid_transition("status", "fulfillment", next).into());
    }

    let mut order = reload(state, order_id).await?;

    for _ in 0..MAX_CAS_ATTEMPTS {
        if order.status == next {
            return Ok(order);
        }
        if order.payment_status != PaymentStatus::Paid {
            return Err(CoreError::invalid_transition("payment_status", order.payment_status, PaymentStatus::Paid).into());
        }
        plan_status_transition(order.status, next)?;

        match state.db.orders().advance_status(&order.id, order.status, next).await {
            Ok(advanced) => return Ok(advanced),
            Err(DbError::StaleState { .. }) => {
                order = reload(state, order_id).await?;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::TransientStorage(format!(
        "order {} kept changing during fulfillment",
        order.order_number
    )))
}

fn ensure_cancellable(order: &Order) -> ServiceResult<()> {
    if !matches!(order.payment_status, PaymentStatus::Pending | PaymentStatus::Failed) {
        return Err(CoreError::invalid_transition("status", order.status, OrderStatus::Cancelled).into());
    }

    if !matches!(order.status, OrderStatus::Pending | OrderStatus::Confirmed) {
        return Err(CoreError::invalid_transition("status", order.status, OrderStatus::Cancelled).into());
    }

    if order.payment_status == PaymentStatus::Pending {
        if let Some(external_id) = order.external_payment_id() {
            debug!(order_number = %order.order_number, external_id, "Cancel refused, provider payment still open");
            return Err(CoreError::invalid_transition("payment_status", "open payment", OrderStatus::Cancelled).into());
        }
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
