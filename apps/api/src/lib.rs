//! # checkstand-api
//!
//! HTTP server and service layer for Checkstand.
//!
//! The service functions in [`services`] are the programmatic surface: they
//! take an explicit owner id and an [`AppState`], so they run the same
//! under axum, in tests, or from another binary. [`routes`] only adapts
//! them to HTTP.

pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{AppConfig, ConfigError, ConfigResult};
pub use error::{ServiceError, ServiceResult};
pub use routes::{router, OwnerId, OWNER_HEADER};
pub use services::reconciler::ReconcileOutcome;
pub use state::AppState;
