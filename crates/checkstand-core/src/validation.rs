//! # Validation Module
//!
//! Structural validation of checkout input.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization (axum Json extractor)                        │
//! │  └── Types and required fields                                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Cart size, quantities, non-negative prices                        │
//! │  └── Address fields, notes length, owner id                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: checkout::validate_checkout against the catalog             │
//! │  └── Existence, stock, authoritative prices                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: SQLite constraints                                           │
//! │  └── CHECK (stock_quantity >= 0), UNIQUE (order_number)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{AddressInput, CartLine, CheckoutRequest};
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY, MAX_NOTES_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_ADDRESS_FIELD_LEN: usize = 200;

// =============================================================================
// Field Validators
// =============================================================================

fn required(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

fn optional(field: &str, value: Option<&str>, max: usize) -> ValidationResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        _ => Ok(()),
    }
}

/// Validates the opaque owner identity supplied by the session layer.
pub fn validate_owner_id(owner_id: &str) -> ValidationResult<()> {
    required("owner_id", owner_id, 128)
}

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (free items).
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates the number of lines in a cart.
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if lines > MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_CART_LINES as i64,
        });
    }

    Ok(())
}

pub fn validate_cart_line(line: &CartLine) -> ValidationResult<()> {
    required("product_id", &line.product_id, 64)?;
    if let Some(variant_id) = &line.variant_id {
        required("variant_id", variant_id, 64)?;
    }
    validate_quantity(line.quantity)?;
    validate_price_cents("unit_price_cents", line.unit_price_cents)
}

/// Validates an address. `prefix` names the address in error messages
/// ("shipping_address.city").
pub fn validate_address(prefix: &str, address: &AddressInput) -> ValidationResult<()> {
    let field = |name: &str| format!("{}.{}", prefix, name);

    required(&field("full_name"), &address.full_name, MAX_ADDRESS_FIELD_LEN)?;
    required(&field("line1"), &address.line1, MAX_ADDRESS_FIELD_LEN)?;
    optional(&field("line2"), address.line2.as_deref(), MAX_ADDRESS_FIELD_LEN)?;
    required(&field("city"), &address.city, MAX_ADDRESS_FIELD_LEN)?;
    optional(&field("region"), address.region.as_deref(), MAX_ADDRESS_FIELD_LEN)?;
    required(&field("postal_code"), &address.postal_code, 20)?;
    optional(&field("phone"), address.phone.as_deref(), 40)?;

    let country = address.country.trim();
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: field("country"),
            reason: "must be a two-letter ISO country code".to_string(),
        });
    }

    Ok(())
}

pub fn validate_notes(notes: Option<&str>) -> ValidationResult<()> {
    optional("notes", notes, MAX_NOTES_LEN)
}

/// Validates everything about a checkout request that does not need the
/// catalog. Fails on the first problem: these are malformed requests, not
/// stale carts.
pub fn validate_checkout_request(owner_id: &str, request: &CheckoutRequest) -> ValidationResult<()> {
    validate_owner_id(owner_id)?;
    validate_cart_size(request.lines.len())?;

    for line in &request.lines {
        validate_cart_line(line)?;
    }

    validate_price_cents("claimed_subtotal_cents", request.claimed_subtotal_cents)?;
    validate_address("shipping_address", &request.shipping_address)?;

    match (&request.billing_address, request.billing_same_as_shipping) {
        (_, true) => {}
        (Some(billing), false) => validate_address("billing_address", billing)?,
        (None, false) => {
            return Err(ValidationError::Required {
                field: "billing_address".to_string(),
            })
        }
    }

    validate_notes(request.notes.as_deref())
}

// =============================================================================
// Unit Tests
// =============================================================================
