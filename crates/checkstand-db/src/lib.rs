//! # checkstand-db: Database Layer for Checkstand
//!
//! Storage for the transactional core: catalog snapshot reads, atomic
//! order placement with conditional stock decrement, payment state writes
//! and the webhook event ledger. SQLite through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Checkstand Data Flow                             │
//! │                                                                         │
//! │  Service layer (apps/api)                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   checkstand-db (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ CatalogRepo    │   │ 001_init.sql │  │   │
//! │  │   │ SqlitePool    │◄───│ OrderRepo      │   │              │  │   │
//! │  │   │ WAL, FKs      │    │ WebhookLedger  │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   retry.rs: bounded backoff for SQLITE_BUSY / pool timeouts    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (checkstand.db)                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`retry`] - Retry policy for transient storage failures
//! - [`error`] - Database error types
//! - [`repository`] - Catalog, order and webhook ledger repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkstand_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./checkstand.db")).await?;
//!
//! let snapshot = db.catalog().snapshot_for(&request.lines).await?;
//! let checkout = checkstand_core::validate_checkout(owner, &request, &snapshot, &policy)?;
//! let order = db.orders().place_order(&checkout).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod retry;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use retry::{with_retry, RetryPolicy};

// Repository re-exports for convenience
pub use repository::catalog::{CatalogRepository, NewProduct, NewVariant};
pub use repository::order::{OrderRepository, PaymentWrite};
pub use repository::webhook::{ClaimOutcome, WebhookEvent, WebhookEventRepository};
