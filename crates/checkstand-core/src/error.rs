//! # Error Types
//!
//! Domain-specific error types for checkstand-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  checkstand-core (this file)                                           │
//! │  ├── CoreError        - Business rule outcomes                         │
//! │  ├── LineIssue        - One offending cart line (collected, not first) │
//! │  └── ValidationError  - Malformed input                                │
//! │                                                                         │
//! │  checkstand-db        └── DbError       - Storage failures             │
//! │  checkstand-payments  └── PaymentError  - Provider failures            │
//! │  checkstand-api       └── ServiceError  - What HTTP callers see        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Business rule errors are expected outcomes. A customer whose cart went
//! stale gets `CheckoutRejected` with every offending line, not a 500.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// One or more cart lines failed authoritative validation.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart: [P1 x2 @ $10.00, P2 x1 @ $5.00, P3 x9 @ $1.00]
    ///      │
    ///      ▼
    /// P1 now costs $12.00, P3 has 4 left
    ///      │
    ///      ▼
    /// CheckoutRejected([PriceMismatch on line 0, OutOfStock on line 2])
    ///      │
    ///      ▼
    /// Storefront fixes both lines in one round trip
    /// ```
    #[error("Checkout rejected: {} line(s) need attention", .0.len())]
    CheckoutRejected(Vec<LineIssue>),

    /// Every line priced correctly but the claimed subtotal disagrees.
    #[error("Subtotal mismatch: claimed {claimed}, actual {authoritative}")]
    TotalMismatch { claimed: Money, authoritative: Money },

    /// Order does not exist (or is not visible to this owner).
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Another checkout consumed the stock between validation and commit.
    #[error("Out of stock for product {product_id}: requested {requested}")]
    OutOfStock { product_id: String, requested: i64 },

    /// The order is already paid; a new payment attempt would double charge.
    #[error("Order {order_number} is already paid")]
    AlreadyPaid { order_number: String },

    /// The lifecycle forbids this transition.
    #[error("Invalid transition for {field}: {from} -> {to}")]
    InvalidTransition {
        field: &'static str,
        from: String,
        to: String,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    pub fn invalid_transition(
        field: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        CoreError::InvalidTransition {
            field,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

// =============================================================================
// Line Issues
// =============================================================================

/// A single cart line that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineIssue {
    /// Position of the line in the submitted cart.
    pub line: usize,
    pub product_id: String,
    pub variant_id: Option<String>,
    #[serde(flatten)]
    pub kind: LineIssueKind,
}

/// Why a cart line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "reason", rename_all = "snake_case")]
#[ts(export)]
pub enum LineIssueKind {
    /// Unknown, inactive, or mismatched product/variant id.
    NotFound,

    /// Not in stock, or tracked stock below the requested quantity.
    /// `available` is `None` when the item is flagged out of stock outright.
    OutOfStock {
        available: Option<i64>,
        requested: i64,
    },

    /// Client-claimed unit price differs from the catalog by more than a cent.
    PriceMismatch { claimed: Money, authoritative: Money },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any catalog lookup, for requests that are malformed
/// regardless of what the catalog says.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
