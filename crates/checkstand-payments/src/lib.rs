//! # checkstand-payments: Payment Provider Adapters
//!
//! One contract over two payment networks. Order logic never branches on
//! "which provider"; it holds a `dyn PaymentGateway` and asks it to create
//! a payable or capture one.
//!
//! ## Payment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Payment Flow                                   │
//! │                                                                         │
//! │  Service Layer                                                          │
//! │       │ create_payable(PayableOrder)                                    │
//! │       ▼                                                                 │
//! │  ┌───────────────────┐          ┌───────────────────┐                   │
//! │  │   StripeGateway   │          │   PaypalGateway   │                   │
//! │  │ POST payment_intents│        │ POST v2/checkout/ │                   │
//! │  │ → client_secret   │          │   orders → approve│                   │
//! │  └─────────┬─────────┘          └─────────┬─────────┘                   │
//! │            │                              │                             │
//! │            ▼                              ▼                             │
//! │      Customer pays               Customer approves, returns             │
//! │            │                              │ capture(order_id)           │
//! │            ▼                              ▼                             │
//! │  Provider ──► POST /webhooks/{provider} ──► SignatureVerifier           │
//! │                                                │                        │
//! │                                                ▼                        │
//! │                                   events::parse_*_event → ProviderEvent │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//! - [`gateway`] - The `PaymentGateway` trait and its request/response types
//! - [`stripe`] - Stripe PaymentIntents
//! - [`paypal`] - PayPal Orders v2 with OAuth2 client credentials
//! - [`events`] - Webhook payload normalisation
//! - [`signature`] - Webhook authenticity checks
//! - [`error`] - Payment error types

pub mod error;
pub mod events;
pub mod gateway;
pub mod paypal;
pub mod signature;
pub mod stripe;

pub use error::{PaymentError, PaymentResult};
pub use events::{parse_event, PaymentEventKind, ProviderEvent};
pub use gateway::{Capture, Payable, PayableOrder, PaymentGateway};
pub use paypal::{PaypalConfig, PaypalGateway};
pub use signature::{PaypalSignatureVerifier, SignatureVerifier, StripeSignatureVerifier};
pub use stripe::{StripeConfig, StripeGateway};

/// Timeout for every outbound provider request.
pub const PROVIDER_TIMEOUT_SECS: u64 = 30;
