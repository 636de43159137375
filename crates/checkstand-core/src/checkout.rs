//! # Checkout Validation
//!
//! Reprices a client cart against a catalog snapshot and produces the only
//! value order placement accepts: [`ValidatedCheckout`].
//!
//! ## Flow
//! ```text
//! CheckoutRequest ──► validation::validate_checkout_request   (malformed? 400)
//!        │
//!        ▼
//! for each line, against CatalogSnapshot:
//!   ├── product/variant known and active?            else NotFound
//!   ├── in stock, tracked stock ≥ Σ requested?       else OutOfStock
//!   └── |claimed − authoritative| ≤ 1¢?              else PriceMismatch
//!        │
//!        ▼  (issues collected, all returned at once)
//! PricingPolicy::quote(authoritative lines)
//!        │
//!        ▼
//! |claimed subtotal − subtotal| ≤ 1¢?                else TotalMismatch
//!        │
//!        ▼
//! ValidatedCheckout (server prices only)
//! ```
//!
//! Nothing here performs I/O. The storage layer loads the snapshot, this
//! module decides.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{CoreError, CoreResult, LineIssue, LineIssueKind, ValidationError};
use crate::money::Money;
use crate::pricing::{PriceBreakdown, PricingPolicy, PRICE_TOLERANCE};
use crate::types::{AddressInput, CartLine, CheckoutRequest, ProductSnapshot, VariantSnapshot};
use crate::validation::validate_checkout_request;

// =============================================================================
// Catalog Snapshot
// =============================================================================

/// Catalog state for the products and variants a cart references.
///
/// Missing keys mean the id is unknown or the product is inactive.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub products: HashMap<String, ProductSnapshot>,
    pub variants: HashMap<String, VariantSnapshot>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, product: ProductSnapshot) -> Self {
        self.products.insert(product.id.clone(), product);
        self
    }

    pub fn with_variant(mut self, variant: VariantSnapshot) -> Self {
        self.variants.insert(variant.id.clone(), variant);
        self
    }
}

// =============================================================================
// Priced Lines
// =============================================================================

/// A cart line priced from the catalog, carrying the snapshot fields that
/// get frozen into the order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedLine {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
    pub product_name: String,
    pub product_slug: String,
    pub image_url: Option<String>,
    pub variant_description: Option<String>,
    pub sku: Option<String>,
    /// Whether the product's stock is tracked and must be decremented.
    pub tracks_stock: bool,
}

/// A checkout that passed every authoritative check.
///
/// Fields are private: the only way to obtain one is
/// [`validate_checkout`], so order placement can never see a client price.
#[derive(Debug, Clone)]
pub struct ValidatedCheckout {
    owner_id: String,
    lines: Vec<PricedLine>,
    totals: PriceBreakdown,
    shipping_address: AddressInput,
    billing_address: AddressInput,
    notes: Option<String>,
}

impl ValidatedCheckout {
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn lines(&self) -> &[PricedLine] {
        &self.lines
    }

    pub fn totals(&self) -> PriceBreakdown {
        self.totals
    }

    pub fn shipping_address(&self) -> &AddressInput {
        &self.shipping_address
    }

    pub fn billing_address(&self) -> &AddressInput {
        &self.billing_address
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Quantity to decrement per tracked product, duplicates summed.
    /// Ordered by product id so concurrent transactions touch rows in the
    /// same order.
    pub fn stock_reservations(&self) -> Vec<(String, i64)> {
        let mut totals: HashMap<&str, i64> = HashMap::new();
        for line in self.lines.iter().filter(|l| l.tracks_stock) {
            *totals.entry(line.product_id.as_str()).or_default() += line.quantity;
        }

        let mut reservations: Vec<(String, i64)> = totals
            .into_iter()
            .map(|(id, qty)| (id.to_string(), qty))
            .collect();
        reservations.sort();
        reservations
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Validates a checkout against the catalog and prices it.
///
/// Structural problems fail fast with [`CoreError::Validation`]. Catalog
/// problems are collected across every line into
/// [`CoreError::CheckoutRejected`]. A subtotal disagreement is only
/// reported once every line is individually correct.
pub fn validate_checkout(
    owner_id: &str,
    request: &CheckoutRequest,
    catalog: &CatalogSnapshot,
    policy: &PricingPolicy,
) -> CoreResult<ValidatedCheckout> {
    validate_checkout_request(owner_id, request)?;

    let requested = requested_per_product(&request.lines);
    let mut issues = Vec::new();
    let mut priced = Vec::with_capacity(request.lines.len());

    for (index, line) in request.lines.iter().enumerate() {
        match price_line(line, catalog, &requested) {
            Ok(line) => priced.push(line),
            Err(kind) => issues.push(LineIssue {
                line: index,
                product_id: line.product_id.clone(),
                variant_id: line.variant_id.clone(),
                kind,
            }),
        }
    }

    if !issues.is_empty() {
        return Err(CoreError::CheckoutRejected(issues));
    }

    let totals = policy.quote(priced.iter().map(|l| (l.unit_price, l.quantity)));
    let claimed = Money::from_cents(request.claimed_subtotal_cents);
    if !claimed.within(totals.subtotal, PRICE_TOLERANCE) {
        return Err(CoreError::TotalMismatch {
            claimed,
            authoritative: totals.subtotal,
        });
    }

    let billing_address = if request.billing_same_as_shipping {
        request.shipping_address.clone()
    } else {
        request
            .billing_address
            .clone()
            .ok_or_else(|| ValidationError::Required {
                field: "billing_address".to_string(),
            })?
    };

    Ok(ValidatedCheckout {
        owner_id: owner_id.to_string(),
        lines: priced,
        totals,
        shipping_address: request.shipping_address.clone(),
        billing_address,
        notes: request
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string),
    })
}

/// Prices the lines of a cart against the catalog without claimed-price
/// checks. Used by the preview endpoint; unknown lines are skipped.
pub fn preview_lines(lines: &[CartLine], catalog: &CatalogSnapshot) -> Vec<(Money, i64)> {
    lines
        .iter()
        .filter_map(|line| {
            let product = catalog.products.get(&line.product_id)?;
            let price = match &line.variant_id {
                Some(id) => {
                    let variant = catalog.variants.get(id)?;
                    if variant.product_id != product.id {
                        return None;
                    }
                    authoritative_price(product, Some(variant))
                }
                None => authoritative_price(product, None),
            };
            Some((price, line.quantity))
        })
        .collect()
}

fn authoritative_price(product: &ProductSnapshot, variant: Option<&VariantSnapshot>) -> Money {
    variant
        .and_then(|v| v.price_override_cents)
        .map(Money::from_cents)
        .unwrap_or_else(|| product.price())
}

fn requested_per_product(lines: &[CartLine]) -> HashMap<&str, i64> {
    let mut requested: HashMap<&str, i64> = HashMap::new();
    for line in lines {
        *requested.entry(line.product_id.as_str()).or_default() += line.quantity;
    }
    requested
}

fn price_line(
    line: &CartLine,
    catalog: &CatalogSnapshot,
    requested: &HashMap<&str, i64>,
) -> Result<PricedLine, LineIssueKind> {
    let product = catalog
        .products
        .get(&line.product_id)
        .ok_or(LineIssueKind::NotFound)?;

    let variant = match &line.variant_id {
        Some(id) => {
            let variant = catalog.variants.get(id).ok_or(LineIssueKind::NotFound)?;
            if variant.product_id != product.id {
                return Err(LineIssueKind::NotFound);
            }
            Some(variant)
        }
        None => None,
    };

    if !product.in_stock || variant.is_some_and(|v| !v.in_stock) {
        return Err(LineIssueKind::OutOfStock {
            available: None,
            requested: line.quantity,
        });
    }

    if let Some(available) = product.stock_quantity {
        let total_requested = requested
            .get(line.product_id.as_str())
            .copied()
            .unwrap_or(line.quantity);
        if available < total_requested {
            return Err(LineIssueKind::OutOfStock {
                available: Some(available),
                requested: total_requested,
            });
        }
    }

    let unit_price = authoritative_price(product, variant);
    let claimed = line.claimed_unit_price();
    if !claimed.within(unit_price, PRICE_TOLERANCE) {
        return Err(LineIssueKind::PriceMismatch {
            claimed,
            authoritative: unit_price,
        });
    }

    Ok(PricedLine {
        product_id: product.id.clone(),
        variant_id: variant.map(|v| v.id.clone()),
        quantity: line.quantity,
        unit_price,
        line_total: unit_price.multiply_quantity(line.quantity),
        product_name: product.name.clone(),
        product_slug: product.slug.clone(),
        image_url: variant
            .and_then(|v| v.image_url.clone())
            .or_else(|| product.primary_image_url.clone()),
        variant_description: variant.map(VariantSnapshot::description),
        sku: variant.and_then(|v| v.sku.clone()),
        tracks_stock: product.tracks_stock(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
