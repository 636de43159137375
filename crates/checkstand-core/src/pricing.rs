//! # Pricing Engine
//!
//! The one and only place where subtotal, tax, shipping and total are
//! computed. The storefront preview endpoint and server-side checkout
//! validation both call [`PricingPolicy::quote`].
//!
//! ## Formula
//! ```text
//! subtotal = Σ unit_price × quantity
//! tax      = subtotal × tax_rate            (half-up to the cent)
//! shipping = 0            if subtotal ≥ free_shipping_threshold
//!            flat_fee     otherwise
//! total    = subtotal + tax + shipping
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::TaxRate;

/// Largest accepted difference between a client-claimed amount and the
/// authoritative one.
pub const PRICE_TOLERANCE: Money = Money::from_cents(1);

/// Policy constants for pricing a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub tax_rate: TaxRate,
    pub free_shipping_threshold: Money,
    pub flat_shipping_fee: Money,
}

impl Default for PricingPolicy {
    /// 8% tax, free shipping from $75.00, otherwise $9.99.
    fn default() -> Self {
        PricingPolicy {
            tax_rate: TaxRate::from_bps(800),
            free_shipping_threshold: Money::from_cents(7500),
            flat_shipping_fee: Money::from_cents(999),
        }
    }
}

/// Computed totals for a cart or an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
}

impl PricingPolicy {
    pub fn new(tax_rate: TaxRate, free_shipping_threshold: Money, flat_shipping_fee: Money) -> Self {
        PricingPolicy {
            tax_rate,
            free_shipping_threshold,
            flat_shipping_fee,
        }
    }

    /// Prices a list of `(unit price, quantity)` pairs.
    ///
    /// Free items still ship: a zero subtotal pays the flat fee like any
    /// other subtotal under the threshold.
    pub fn quote<I>(&self, lines: I) -> PriceBreakdown
    where
        I: IntoIterator<Item = (Money, i64)>,
    {
        let subtotal: Money = lines
            .into_iter()
            .map(|(unit_price, qty)| unit_price.multiply_quantity(qty))
            .sum();

        let tax = subtotal.calculate_tax(self.tax_rate);
        let shipping = self.shipping_for(subtotal);

        PriceBreakdown {
            subtotal,
            tax,
            shipping,
            total: subtotal + tax + shipping,
        }
    }

    /// Shipping fee for a given subtotal.
    pub fn shipping_for(&self, subtotal: Money) -> Money {
        if subtotal >= self.free_shipping_threshold {
            Money::zero()
        } else {
            self.flat_shipping_fee
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
