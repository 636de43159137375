//! # HTTP Routes
//!
//! Thin axum handlers. Each one pulls the owner identity and payload out of
//! the request and hands them to a service function; no business rules live
//! here.
//!
//! ```text
//! ┌──────────────────────────────────────┬──────────────────────────────────┐
//! │ Route                                │ Service                          │
//! ├──────────────────────────────────────┼──────────────────────────────────┤
//! │ POST /api/checkout/preview           │ checkout::preview                │
//! │ POST /api/checkout                   │ checkout::place_order (201)      │
//! │ GET  /api/orders                     │ orders::list_orders              │
//! │ GET  /api/orders/{id}                │ orders::get_order                │
//! │ POST /api/orders/{id}/payments       │ payments::create_payable         │
//! │ POST /api/orders/{id}/return         │ payments::confirm_return         │
//! │ POST /api/orders/{id}/cancel         │ orders::cancel_order             │
//! │ POST /webhooks/stripe                │ reconciler::handle_webhook       │
//! │ POST /webhooks/paypal                │ reconciler::handle_webhook       │
//! │ GET  /health                         │ database ping                    │
//! └──────────────────────────────────────┴──────────────────────────────────┘
//! ```

use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error::{ServiceError, ServiceResult};
use crate::services::payments::{CreatePaymentRequest, PaymentSession};
use crate::services::{checkout, orders, payments, reconciler};
use crate::state::AppState;
use checkstand_core::{CheckoutRequest, OrderDetails, PaymentProvider, PriceBreakdown, ValidationError};

/// Header the upstream identity layer sets on every authenticated request.
pub const OWNER_HEADER: &str = "x-owner-id";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/checkout/preview", post(preview_checkout))
        .route("/api/checkout", post(place_order))
        .route("/api/orders", get(list_orders))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/payments", post(create_payment))
        .route("/api/orders/{id}/return", post(confirm_return))
        .route("/api/orders/{id}/cancel", post(cancel_order))
        .route("/webhooks/stripe", post(stripe_webhook))
        .route("/webhooks/paypal", post(paypal_webhook))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Owner Identity
// =============================================================================

/// Verified owner id, as supplied by the identity layer in front of us.
#[derive(Debug, Clone)]
pub struct OwnerId(pub String);

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| OwnerId(value.to_string()))
            .ok_or_else(|| {
                ServiceError::Validation(ValidationError::Required {
                    field: "owner_id".to_string(),
                })
            })
    }
}

// =============================================================================
// Checkout
// =============================================================================

async fn preview_checkout(
    State(state): State<AppState>,
    Json(request): Json<checkout::PreviewRequest>,
) -> ServiceResult<Json<PriceBreakdown>> {
    Ok(Json(checkout::preview(&state, &request).await?))
}

async fn place_order(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Json(request): Json<CheckoutRequest>,
) -> ServiceResult<(StatusCode, Json<OrderDetails>)> {
    let details = checkout::place_order(&state, &owner_id, &request).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

// =============================================================================
// Orders
// =============================================================================

async fn list_orders(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> ServiceResult<Json<Vec<OrderDetails>>> {
    Ok(Json(orders::list_orders(&state, &owner_id).await?))
}

async fn get_order(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<String>,
) -> ServiceResult<Json<OrderDetails>> {
    Ok(Json(orders::get_order(&state, &owner_id, &id).await?))
}

async fn cancel_order(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<String>,
) -> ServiceResult<Json<OrderDetails>> {
    Ok(Json(orders::cancel_order(&state, &owner_id, &id).await?))
}

// =============================================================================
// Payments
// =============================================================================

async fn create_payment(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<String>,
    Json(request): Json<CreatePaymentRequest>,
) -> ServiceResult<Json<PaymentSession>> {
    Ok(Json(
        payments::create_payable(&state, &owner_id, &id, request.provider).await?,
    ))
}

async fn confirm_return(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<String>,
) -> ServiceResult<Json<OrderDetails>> {
    Ok(Json(payments::confirm_return(&state, &owner_id, &id).await?))
}

// =============================================================================
// Webhooks
// =============================================================================

async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<impl IntoResponse> {
    webhook(&state, PaymentProvider::Stripe, &headers, &body).await
}

async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<impl IntoResponse> {
    webhook(&state, PaymentProvider::Paypal, &headers, &body).await
}

/// Providers only look at the status code.
async fn webhook(
    state: &AppState,
    provider: PaymentProvider,
    headers: &HeaderMap,
    body: &[u8],
) -> ServiceResult<impl IntoResponse> {
    reconciler::handle_webhook(state, provider, body, headers).await?;
    Ok(Json(json!({ "received": true })))
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    if state.db.health_check().await {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "degraded" })))
    }
}
