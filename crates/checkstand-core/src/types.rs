//! # Domain Types
//!
//! Core domain types used throughout Checkstand.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Client input (ephemeral)        Persisted (immutable snapshots)        │
//! │  ────────────────────────        ───────────────────────────────        │
//! │  CartLine                        Order ──┬── OrderItem (1..n)           │
//! │  AddressInput                            ├── Address (shipping)         │
//! │  CheckoutRequest                         └── Address (billing)          │
//! │                                                                         │
//! │  Catalog reads (external, read-only)                                    │
//! │  ────────────────────────────────────                                   │
//! │  ProductSnapshot   VariantSnapshot                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Orders carry a UUID `id` for relations and a human-readable
//! `order_number` (`ORD-20260131-K7Q2ZP`) that doubles as the correlation
//! id sent to payment providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::pricing::PriceBreakdown;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 800 bps = 8%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

// =============================================================================
// Payment Provider
// =============================================================================

/// The external payment networks an order can be paid through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PaymentProvider {
    Stripe,
    Paypal,
}

impl PaymentProvider {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Paypal => "paypal",
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stripe" => Ok(PaymentProvider::Stripe),
            "paypal" => Ok(PaymentProvider::Paypal),
            other => Err(ValidationError::InvalidFormat {
                field: "provider".to_string(),
                reason: format!("unknown payment provider '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Fulfillment lifecycle of an order. Transition rules live in
/// [`crate::lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Status
// =============================================================================

/// Settlement state of an order's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Client Input
// =============================================================================

/// One line of a client-submitted cart. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    pub quantity: i64,
    /// Unit price the storefront displayed, in cents. Only compared, never trusted.
    pub unit_price_cents: i64,
}

impl CartLine {
    #[inline]
    pub fn claimed_unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

/// Address as submitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AddressInput {
    pub full_name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Everything the storefront submits to place an order.
///
/// The owner identity is deliberately absent: it comes from the verified
/// session and is passed alongside, never read from the body.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutRequest {
    pub lines: Vec<CartLine>,
    pub shipping_address: AddressInput,
    #[serde(default)]
    pub billing_address: Option<AddressInput>,
    #[serde(default)]
    pub billing_same_as_shipping: bool,
    #[serde(default)]
    pub notes: Option<String>,
    /// Subtotal the storefront displayed, in cents.
    pub claimed_subtotal_cents: i64,
}

// =============================================================================
// Catalog Snapshots
// =============================================================================

/// Current catalog state of a product, as read at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductSnapshot {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub price_cents: i64,
    pub in_stock: bool,
    /// `None` means stock is not tracked (unlimited).
    pub stock_quantity: Option<i64>,
    pub primary_image_url: Option<String>,
}

impl ProductSnapshot {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn tracks_stock(&self) -> bool {
        self.stock_quantity.is_some()
    }
}

/// Current catalog state of a product variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct VariantSnapshot {
    pub id: String,
    pub product_id: String,
    /// Option name, e.g. "Size".
    pub name: String,
    /// Option value, e.g. "Large".
    pub value: String,
    pub sku: Option<String>,
    /// Replaces the product price when set.
    pub price_override_cents: Option<i64>,
    pub in_stock: bool,
    pub image_url: Option<String>,
}

impl VariantSnapshot {
    /// "Size: Large", as shown on receipts.
    pub fn description(&self) -> String {
        format!("{}: {}", self.name, self.value)
    }
}

// =============================================================================
// Orders
// =============================================================================

/// A persisted order.
///
/// Monetary fields are server-computed. Only the order placement path
/// writes the initial fields; payment reconciliation writes `status`,
/// `payment_status` and `payment_metadata` and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub owner_id: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub notes: Option<String>,
    pub shipping_address_id: String,
    pub billing_address_id: String,
    pub payment_provider: Option<PaymentProvider>,
    /// Stripe PaymentIntent id.
    pub payment_intent_id: Option<String>,
    /// PayPal order id.
    pub provider_order_id: Option<String>,
    /// Provider responses and applied webhook events, for audit.
    #[ts(type = "Record<string, unknown>")]
    pub payment_metadata: serde_json::Value,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    pub fn totals(&self) -> PriceBreakdown {
        PriceBreakdown {
            subtotal: Money::from_cents(self.subtotal_cents),
            tax: Money::from_cents(self.tax_cents),
            shipping: Money::from_cents(self.shipping_cents),
            total: Money::from_cents(self.total_cents),
        }
    }

    /// The provider correlation id recorded for this order, if any.
    pub fn external_payment_id(&self) -> Option<&str> {
        match self.payment_provider? {
            PaymentProvider::Stripe => self.payment_intent_id.as_deref(),
            PaymentProvider::Paypal => self.provider_order_id.as_deref(),
        }
    }
}

/// A line item frozen at purchase time.
///
/// Later catalog edits (renames, price changes, deleted images) never
/// reach historical orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub product_name: String,
    pub product_slug: String,
    pub image_url: Option<String>,
    pub variant_description: Option<String>,
    pub sku: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    /// Whether inventory was decremented for this line.
    pub stock_reserved: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Shipping or billing address snapshot owned by one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Address {
    pub id: String,
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// An order with its items and addresses, as returned to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub billing_address: Address,
}

// =============================================================================
// Unit Tests
// =============================================================================
