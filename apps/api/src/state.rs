//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::AppConfig;
use crate::error::{ServiceError, ServiceResult};
use checkstand_core::{PaymentProvider, PricingPolicy, ValidationError};
use checkstand_db::Database;
use checkstand_payments::{
    PaymentGateway, PaymentResult, PaypalGateway, PaypalSignatureVerifier, SignatureVerifier,
    StripeGateway, StripeSignatureVerifier,
};

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub policy: PricingPolicy,
    pub claim_lease: Duration,
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
    verifiers: HashMap<PaymentProvider, Arc<dyn SignatureVerifier>>,
}

impl AppState {
    pub fn new(db: Database, policy: PricingPolicy) -> Self {
        AppState {
            db,
            policy,
            claim_lease: Duration::from_secs(60),
            gateways: HashMap::new(),
            verifiers: HashMap::new(),
        }
    }

    /// Builds state with a gateway and verifier for every configured provider.
    pub fn from_config(config: &AppConfig, db: Database) -> PaymentResult<Self> {
        let mut state = AppState::new(db, config.pricing_policy()).with_claim_lease(config.claim_lease());

        if let Some(stripe) = &config.stripe {
            state = state
                .with_gateway(Arc::new(StripeGateway::new(stripe.gateway_config())?))
                .with_verifier(
                    PaymentProvider::Stripe,
                    Arc::new(StripeSignatureVerifier::new(stripe.webhook_secret.clone())),
                );
            info!("Stripe enabled");
        }

        if let Some(paypal) = &config.paypal {
            let gateway = Arc::new(PaypalGateway::new(paypal.gateway_config())?);
            state = state
                .with_gateway(gateway.clone())
                .with_verifier(PaymentProvider::Paypal, Arc::new(PaypalSignatureVerifier::new(gateway)));
            info!("PayPal enabled");
        }

        Ok(state)
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    pub fn with_verifier(mut self, provider: PaymentProvider, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifiers.insert(provider, verifier);
        self
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    pub fn gateway(&self, provider: PaymentProvider) -> ServiceResult<Arc<dyn PaymentGateway>> {
        self.gateways.get(&provider).cloned().ok_or_else(|| {
            ServiceError::Validation(ValidationError::InvalidFormat {
                field: "provider".to_string(),
                reason: format!("{} payments are not enabled", provider),
            })
        })
    }

    pub fn verifier(&self, provider: PaymentProvider) -> Option<Arc<dyn SignatureVerifier>> {
        self.verifiers.get(&provider).cloned()
    }
}
