//! # Service Errors
//!
//! The error taxonomy callers see, and how each maps onto HTTP.
//!
//! ```text
//! ┌──────────────────────────┬────────┬────────────────────────────────────┐
//! │ Variant                  │ Status │ Who retries                        │
//! ├──────────────────────────┼────────┼────────────────────────────────────┤
//! │ Validation               │ 400    │ client fixes input                 │
//! │ InvalidSignature         │ 400    │ nobody (body never says why)       │
//! │ InvalidPayload           │ 400    │ nobody                             │
//! │ UnresolvedCorrelation    │ 400    │ nobody                             │
//! │ NotFound                 │ 404    │ nobody                             │
//! │ OutOfStock               │ 409    │ client adjusts cart                │
//! │ AlreadyPaid              │ 409    │ nobody                             │
//! │ InvalidTransition        │ 409    │ nobody                             │
//! │ CheckoutRejected         │ 422    │ client fixes every listed line     │
//! │ TotalMismatch            │ 422    │ client refreshes preview           │
//! │ Gateway                  │ 502    │ client / provider later            │
//! │ EventInFlight            │ 503    │ provider redelivers                │
//! │ TransientStorage         │ 503    │ client / provider later            │
//! │ Internal                 │ 500    │ -                                  │
//! └──────────────────────────┴────────┴────────────────────────────────────┘
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use checkstand_core::{CoreError, LineIssue, Money, ValidationError};
use checkstand_db::DbError;
use checkstand_payments::PaymentError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Out of stock for product {product_id}: requested {requested}")]
    OutOfStock { product_id: String, requested: i64 },

    #[error("Checkout rejected: {} line(s) need attention", .0.len())]
    CheckoutRejected(Vec<LineIssue>),

    #[error("Subtotal mismatch: claimed {claimed}, actual {authoritative}")]
    TotalMismatch { claimed: Money, authoritative: Money },

    #[error("Order {order_number} is already paid")]
    AlreadyPaid { order_number: String },

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Webhook references an unknown order: {0}")]
    UnresolvedCorrelation(String),

    #[error("Invalid transition for {field}: {from} -> {to}")]
    InvalidTransition {
        field: &'static str,
        from: String,
        to: String,
    },

    #[error("Event {0} is being processed by another delivery")]
    EventInFlight(String),

    #[error("Temporary storage failure: {0}")]
    TransientStorage(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Payment provider error: {0}")]
    Gateway(#[from] PaymentError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_)
            | ServiceError::InvalidSignature
            | ServiceError::InvalidPayload(_)
            | ServiceError::UnresolvedCorrelation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::OutOfStock { .. }
            | ServiceError::AlreadyPaid { .. }
            | ServiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ServiceError::CheckoutRejected(_) | ServiceError::TotalMismatch { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ServiceError::EventInFlight(_) | ServiceError::TransientStorage(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::OutOfStock { .. } => "OUT_OF_STOCK",
            ServiceError::CheckoutRejected(_) => "CHECKOUT_REJECTED",
            ServiceError::TotalMismatch { .. } => "TOTAL_MISMATCH",
            ServiceError::AlreadyPaid { .. } => "ALREADY_PAID",
            ServiceError::InvalidSignature => "INVALID_SIGNATURE",
            ServiceError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ServiceError::UnresolvedCorrelation(_) => "UNRESOLVED_CORRELATION",
            ServiceError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ServiceError::EventInFlight(_) => "EVENT_IN_FLIGHT",
            ServiceError::TransientStorage(_) => "TEMPORARILY_UNAVAILABLE",
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::Gateway(_) => "PAYMENT_PROVIDER_ERROR",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show a client. Infrastructure detail stays in logs.
    fn public_message(&self) -> String {
        match self {
            ServiceError::Gateway(_) => "The payment provider could not complete the request".into(),
            ServiceError::TransientStorage(_) | ServiceError::EventInFlight(_) => {
                "Temporarily unavailable, try again".into()
            }
            ServiceError::Internal(_) => "Internal error".into(),
            ServiceError::UnresolvedCorrelation(_) => "Unknown order".into(),
            ServiceError::InvalidPayload(_) => "Unreadable event payload".into(),
            other => other.to_string(),
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::CheckoutRejected(issues) => ServiceError::CheckoutRejected(issues),
            CoreError::TotalMismatch { claimed, authoritative } => {
                ServiceError::TotalMismatch { claimed, authoritative }
            }
            CoreError::OrderNotFound(id) => ServiceError::NotFound(format!("Order {}", id)),
            CoreError::OutOfStock { product_id, requested } => {
                ServiceError::OutOfStock { product_id, requested }
            }
            CoreError::AlreadyPaid { order_number } => ServiceError::AlreadyPaid { order_number },
            CoreError::InvalidTransition { field, from, to } => {
                ServiceError::InvalidTransition { field, from, to }
            }
            CoreError::Validation(err) => ServiceError::Validation(err),
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        if err.is_transient() {
            return ServiceError::TransientStorage(err.to_string());
        }

        match err {
            DbError::NotFound { entity, id } => ServiceError::NotFound(format!("{} {}", entity, id)),
            DbError::StockConflict { product_id, requested } => {
                ServiceError::OutOfStock { product_id, requested }
            }
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    issues: Option<Vec<LineIssue>>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }

        let body = ErrorBody {
            code: self.code(),
            message: self.public_message(),
            issues: match self {
                ServiceError::CheckoutRejected(issues) => Some(issues),
                _ => None,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkstand_core::LineIssueKind;

    #[test]
    fn test_status_codes() {
        assert_eq!(ServiceError::InvalidSignature.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::OutOfStock { product_id: "p".into(), requested: 1 }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::CheckoutRejected(vec![]).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::EventInFlight("evt_1".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_transient_db_errors_become_503() {
        let err: ServiceError = DbError::Busy("database is locked".into()).into();
        assert!(matches!(err, ServiceError::TransientStorage(_)));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_stock_conflict_becomes_out_of_stock() {
        let err: ServiceError = DbError::StockConflict {
            product_id: "p1".into(),
            requested: 2,
        }
        .into();
        assert!(matches!(err, ServiceError::OutOfStock { ref product_id, requested: 2 } if product_id == "p1"));
    }

    #[test]
    fn test_internal_detail_is_not_exposed() {
        let err = ServiceError::Internal("constraint failed on orders.total_cents".into());
        assert_eq!(err.public_message(), "Internal error");

        let err = ServiceError::UnresolvedCorrelation("ORD-20260101-ABC123".into());
        assert!(!err.public_message().contains("ORD-"));
    }

    #[test]
    fn test_rejection_body_lists_issues() {
        let err = ServiceError::CheckoutRejected(vec![LineIssue {
            line: 0,
            product_id: "p1".into(),
            variant_id: None,
            kind: LineIssueKind::NotFound,
        }]);

        let body = ErrorBody {
            code: err.code(),
            message: err.public_message(),
            issues: match err {
                ServiceError::CheckoutRejected(issues) => Some(issues),
                _ => None,
            },
        };
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["code"], "CHECKOUT_REJECTED");
        assert_eq!(json["issues"][0]["reason"], "not_found");
    }
}
