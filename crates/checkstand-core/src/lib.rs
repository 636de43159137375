//! # checkstand-core: Pure Business Logic for Checkstand
//!
//! Everything in this crate is deterministic and free of I/O. Storage and
//! payment providers live in sibling crates; they consume the types and
//! rules defined here.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Checkstand Architecture                          │
//! │                                                                         │
//! │  Storefront ──► POST /api/checkout/preview ──┐                          │
//! │                                              │  same quote()            │
//! │  Storefront ──► POST /api/checkout ──────────┤                          │
//! │                                              ▼                          │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ checkstand-core (THIS CRATE) ★                  │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌───────────────┐  │   │
//! │  │   │  money   │  │ pricing  │  │ checkout │  │  lifecycle    │  │   │
//! │  │   │  Money   │  │  quote() │  │ validate │  │ OrderStatus   │  │   │
//! │  │   │ TaxRate  │  │ Breakdown│  │  lines   │  │ PaymentStatus │  │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └───────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                 │                                 │                     │
//! │        checkstand-db (SQLite)          checkstand-payments (HTTP)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`pricing`] - The single pricing implementation shared by preview and checkout
//! - [`checkout`] - Authoritative repricing of a client cart against a catalog snapshot
//! - [`lifecycle`] - Order and payment state machine
//! - [`types`] - Domain types (Order, OrderItem, Address, catalog snapshots)
//! - [`validation`] - Structural input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use checkstand_core::money::Money;
//! use checkstand_core::pricing::PricingPolicy;
//!
//! let policy = PricingPolicy::default();
//! let quote = policy.quote([(Money::from_cents(1000), 2)]);
//!
//! assert_eq!(quote.subtotal.cents(), 2000);
//! assert_eq!(quote.tax.cents(), 160);
//! assert_eq!(quote.shipping.cents(), 999);
//! assert_eq!(quote.total.cents(), 3159);
//! ```

pub mod checkout;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

pub use checkout::{validate_checkout, CatalogSnapshot, PricedLine, ValidatedCheckout};
pub use error::{CoreError, CoreResult, LineIssue, LineIssueKind, ValidationError};
pub use lifecycle::{PaymentOutcome, PaymentTransition};
pub use money::Money;
pub use pricing::{PriceBreakdown, PricingPolicy, PRICE_TOLERANCE};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity on a single cart line.
///
/// Catches typos like 1000 instead of 10 before they reach inventory.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Maximum length of free-form order notes.
pub const MAX_NOTES_LEN: usize = 1000;
