//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  A storefront in JavaScript computes:                                   │
//! │    19.99 * 3 = 59.97000000000001                                        │
//! │                                                                         │
//! │  If the server compared that against its own float math, a 1e-14       │
//! │  difference could reject a valid cart or accept a tampered one.        │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    1999 * 3 = 5997 cents, exactly, on every machine                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decimal strings only appear at the edge, for providers (PayPal) whose
//! wire format transports amounts as `"31.59"`.
//!
//! ## Usage
//! ```rust
//! use checkstand_core::money::Money;
//!
//! let price = Money::from_cents(1099); // $10.99
//! let line = price * 2;                // $21.98
//! assert_eq!(line.to_decimal_string(), "21.98");
//! assert_eq!(Money::from_decimal_str("21.98"), Some(line));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: differences between claimed and authoritative prices
///   can be negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Serialized as a bare integer** so JSON carries cents, never floats
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[serde(transparent)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use checkstand_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (dollars) portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns true when `self` and `other` differ by at most `tolerance`.
    ///
    /// ```rust
    /// use checkstand_core::money::Money;
    ///
    /// let one_cent = Money::from_cents(1);
    /// assert!(Money::from_cents(1000).within(Money::from_cents(1001), one_cent));
    /// assert!(!Money::from_cents(1000).within(Money::from_cents(1002), one_cent));
    /// ```
    #[inline]
    pub const fn within(&self, other: Money, tolerance: Money) -> bool {
        (self.0 - other.0).abs() <= tolerance.0
    }

    /// Calculates tax on this amount, rounding half up to the cent.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`. The +5000 is the
    /// half-cent rounding term (5000/10000 = 0.5).
    ///
    /// ```rust
    /// use checkstand_core::money::Money;
    /// use checkstand_core::types::TaxRate;
    ///
    /// let subtotal = Money::from_cents(2000);
    /// assert_eq!(subtotal.calculate_tax(TaxRate::from_bps(800)).cents(), 160);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        // i128 so large carts cannot overflow the intermediate product
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(tax_cents as i64)
    }

    /// Multiplies a unit price by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Parses a decimal amount such as `"31.59"`, `"5"` or `"0.5"`.
    ///
    /// Returns `None` for anything with more than two fractional digits,
    /// a sign, or non-digit characters. Provider payloads never carry
    /// negative amounts.
    pub fn from_decimal_str(value: &str) -> Option<Money> {
        let value = value.trim();
        let (whole, frac) = match value.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (value, ""),
        };

        if whole.is_empty() || frac.len() > 2 {
            return None;
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let whole: i64 = whole.parse().ok()?;
        let frac_cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().ok()? * 10,
            _ => frac.parse().ok()?,
        };

        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .map(Money)
    }

    /// Formats the amount as a plain decimal string (`"31.59"`), the format
    /// PayPal expects in `amount.value`.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display for logs. Storefront formatting handles localization.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
