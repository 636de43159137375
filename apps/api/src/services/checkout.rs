//! Checkout: preview pricing, authoritative validation, order placement.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::state::AppState;
use checkstand_core::checkout::preview_lines;
use checkstand_core::validation::{validate_cart_line, validate_cart_size, validate_checkout_request};
use checkstand_core::{validate_checkout, CartLine, CheckoutRequest, OrderDetails, PriceBreakdown, ValidatedCheckout};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub lines: Vec<CartLine>,
}

/// Storefront preview: the same quote checkout will compute, at current
/// catalog prices. Unknown lines are left out rather than rejected; a
/// cart with nothing priceable quotes zero.
pub async fn preview(state: &AppState, request: &PreviewRequest) -> ServiceResult<PriceBreakdown> {
    validate_cart_size(request.lines.len())?;
    for line in &request.lines {
        validate_cart_line(line)?;
    }

    let catalog = state.db.catalog().snapshot_for(&request.lines).await?;
    let priced = preview_lines(&request.lines, &catalog);
    if priced.is_empty() {
        debug!(lines = request.lines.len(), "Nothing priceable in preview");
        return Ok(PriceBreakdown::default());
    }

    Ok(state.policy.quote(priced))
}

/// Reprices a cart against the live catalog. Read-only.
pub async fn validate(
    state: &AppState,
    owner_id: &str,
    request: &CheckoutRequest,
) -> ServiceResult<ValidatedCheckout> {
    // Cheap structural checks before touching the catalog
    validate_checkout_request(owner_id, request)?;

    let catalog = state.db.catalog().snapshot_for(&request.lines).await?;

    validate_checkout(owner_id, request, &catalog, &state.policy).map_err(|err| {
        warn!(owner_id, error = %err, "Checkout rejected");
        ServiceError::from(err)
    })
}

/// Validates and places an order in one call.
///
/// Stock can still run out between validation and commit; the
/// conditional decrement catches that and the caller sees `OutOfStock`.
pub async fn place_order(
    state: &AppState,
    owner_id: &str,
    request: &CheckoutRequest,
) -> ServiceResult<OrderDetails> {
    let checkout = validate(state, owner_id, request).await?;
    debug!(owner_id, total = %checkout.totals().total, lines = checkout.lines().len(), "Checkout validated");

    let order = state.db.orders().place_order(&checkout).await?;

    info!(
        order_number = %order.order_number,
        owner_id,
        total = %order.total(),
        "Order placed"
    );

    state
        .db
        .orders()
        .get_for_owner(owner_id, &order.id)
        .await?
        .ok_or_else(|| ServiceError::Internal(format!("order {} vanished after commit", order.id)))
}
