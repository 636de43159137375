//! # Service Layer
//!
//! Orchestrates core rules, storage and payment providers. Every function
//! takes the caller's identity as an explicit argument; nothing here reads
//! ambient request state.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  checkout    preview, validate, place_order                             │
//! │                 │ snapshot_for ──► validate_checkout ──► place_order    │
//! │                                                                         │
//! │  payments    create_payable, confirm_return                             │
//! │                 │ gateway call ──► attach_correlation                   │
//! │                 └ capture ──────► reconciler::apply_outcome             │
//! │                                                                         │
//! │  reconciler  handle_webhook                                             │
//! │                 │ verify ──► parse ──► claim ──► apply_outcome ──► mark │
//! │                                                                         │
//! │  orders      get_order, list_orders, cancel_order, advance_fulfillment  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod checkout;
pub mod orders;
pub mod payments;
pub mod reconciler;

/// Attempts at a compare-and-swap write before giving up on a hot order.
pub(crate) const MAX_CAS_ATTEMPTS: usize = 5;
