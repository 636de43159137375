//! # Repository Module
//!
//! Database repository implementations for Checkstand.
//!
//! ## Who Writes What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CatalogRepository      read-only at checkout (snapshot_for)           │
//! │                         stock written ONLY inside OrderRepository txs  │
//! │                                                                         │
//! │  OrderRepository        place_order   → orders, order_items, addresses │
//! │                                         + conditional stock decrement  │
//! │                         attach_correlation, apply_payment_transition,  │
//! │                         record_anomaly → status / payment fields only  │
//! │                         cancel, advance_status → status (CAS)          │
//! │                                                                         │
//! │  WebhookEventRepository claim / mark_processed / release               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`catalog::CatalogRepository`] - Catalog snapshot reads (and seeding)
//! - [`order::OrderRepository`] - Order placement and state writes
//! - [`webhook::WebhookEventRepository`] - Webhook idempotency ledger

pub mod catalog;
pub mod order;
pub mod webhook;
