//! # Server Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CHECKSTAND_BIND_ADDR=0.0.0.0:8080                                  │
//! │     CHECKSTAND_STRIPE_API_KEY=sk_live_...                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, or CHECKSTAND_CONFIG, or                          │
//! │     ~/.config/checkstand/checkstand.toml (Linux)                       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:8080"
//!
//! [database]
//! path = "/var/lib/checkstand/checkstand.db"
//! max_connections = 8
//!
//! [pricing]
//! tax_rate_bps = 800
//! free_shipping_threshold_cents = 7500
//! flat_shipping_fee_cents = 999
//!
//! [storage_retry]
//! max_attempts = 3
//! initial_backoff_ms = 50
//!
//! [webhook]
//! claim_lease_secs = 60
//!
//! [stripe]
//! api_key = "sk_test_..."
//! webhook_secret = "whsec_..."
//!
//! [paypal]
//! client_id = "..."
//! client_secret = "..."
//! webhook_id = "WH-..."
//! api_base = "https://api-m.sandbox.paypal.com"
//! ```
//!
//! A provider is enabled by the presence of its section. Secrets never
//! appear in `Debug` output.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use checkstand_core::{Money, PricingPolicy, TaxRate};
use checkstand_db::{DbConfig, RetryPolicy};
use checkstand_payments::paypal::PAYPAL_API_BASE;
use checkstand_payments::stripe::STRIPE_API_BASE;
use checkstand_payments::{PaypalConfig, StripeConfig};

const ENV_PREFIX: &str = "CHECKSTAND_";

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./checkstand.db")
}

fn default_max_connections() -> u32 {
    8
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    #[serde(default = "default_tax_rate_bps")]
    pub tax_rate_bps: u32,

    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold_cents: i64,

    #[serde(default = "default_flat_shipping_fee")]
    pub flat_shipping_fee_cents: i64,
}

fn default_tax_rate_bps() -> u32 {
    800
}

fn default_free_shipping_threshold() -> i64 {
    7500
}

fn default_flat_shipping_fee() -> i64 {
    999
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings {
            tax_rate_bps: default_tax_rate_bps(),
            free_shipping_threshold_cents: default_free_shipping_threshold(),
            flat_shipping_fee_cents: default_flat_shipping_fee(),
        }
    }
}

/// Bounded retries for SQLITE_BUSY and pool timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageRetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    50
}

impl Default for StorageRetrySettings {
    fn default() -> Self {
        StorageRetrySettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// How long an unreleased ledger claim blocks redelivery.
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,
}

fn default_claim_lease() -> u64 {
    60
}

impl Default for WebhookSettings {
    fn default() -> Self {
        WebhookSettings {
            claim_lease_secs: default_claim_lease(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct StripeSettings {
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub webhook_secret: String,

    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,

    #[serde(default = "default_stripe_currency")]
    pub currency: String,
}

fn default_stripe_api_base() -> String {
    STRIPE_API_BASE.to_string()
}

fn default_stripe_currency() -> String {
    "usd".to_string()
}

impl fmt::Debug for StripeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeSettings")
            .field("api_key", &"<redacted>")
            .field("webhook_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("currency", &self.currency)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PaypalSettings {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default)]
    pub webhook_id: String,

    #[serde(default = "default_paypal_api_base")]
    pub api_base: String,

    #[serde(default = "default_paypal_currency")]
    pub currency: String,

    /// Where PayPal sends the customer after approval.
    #[serde(default)]
    pub return_url: Option<String>,

    #[serde(default)]
    pub cancel_url: Option<String>,
}

fn default_paypal_api_base() -> String {
    PAYPAL_API_BASE.to_string()
}

fn default_paypal_currency() -> String {
    "USD".to_string()
}

impl fmt::Debug for PaypalSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaypalSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("webhook_id", &self.webhook_id)
            .field("api_base", &self.api_base)
            .field("currency", &self.currency)
            .field("return_url", &self.return_url)
            .finish()
    }
}

// =============================================================================
// AppConfig
// =============================================================================

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub pricing: PricingSettings,

    #[serde(default)]
    pub storage_retry: StorageRetrySettings,

    #[serde(default)]
    pub webhook: WebhookSettings,

    #[serde(default)]
    pub stripe: Option<StripeSettings>,

    #[serde(default)]
    pub paypal: Option<PaypalSettings>,
}

impl AppConfig {
    /// Loads configuration: defaults, then the TOML file (if it exists),
    /// then `CHECKSTAND_*` environment variables. Validates the result.
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = match config_path.or_else(Self::default_config_path) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        info!(?path, "Loading config from file");
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Platform config location (`~/.config/checkstand/checkstand.toml` on Linux).
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "checkstand", "checkstand")
            .map(|dirs| dirs.config_dir().join("checkstand.toml"))
    }

    /// Applies overrides from `lookup`, keyed without the `CHECKSTAND_` prefix.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse("DATABASE_MAX_CONNECTIONS", &max)?;
        }
        if let Some(bps) = lookup("TAX_RATE_BPS") {
            self.pricing.tax_rate_bps = parse("TAX_RATE_BPS", &bps)?;
        }
        if let Some(cents) = lookup("FREE_SHIPPING_THRESHOLD_CENTS") {
            self.pricing.free_shipping_threshold_cents = parse("FREE_SHIPPING_THRESHOLD_CENTS", &cents)?;
        }
        if let Some(cents) = lookup("FLAT_SHIPPING_FEE_CENTS") {
            self.pricing.flat_shipping_fee_cents = parse("FLAT_SHIPPING_FEE_CENTS", &cents)?;
        }
        if let Some(attempts) = lookup("STORAGE_RETRY_MAX_ATTEMPTS") {
            self.storage_retry.max_attempts = parse("STORAGE_RETRY_MAX_ATTEMPTS", &attempts)?;
        }
        if let Some(lease) = lookup("WEBHOOK_CLAIM_LEASE_SECS") {
            self.webhook.claim_lease_secs = parse("WEBHOOK_CLAIM_LEASE_SECS", &lease)?;
        }

        // Setting any provider secret enables that provider
        if let Some(key) = lookup("STRIPE_API_KEY") {
            self.stripe.get_or_insert_with(StripeSettings::defaults).api_key = key;
        }
        if let Some(secret) = lookup("STRIPE_WEBHOOK_SECRET") {
            self.stripe.get_or_insert_with(StripeSettings::defaults).webhook_secret = secret;
        }
        if let Some(id) = lookup("PAYPAL_CLIENT_ID") {
            self.paypal.get_or_insert_with(PaypalSettings::defaults).client_id = id;
        }
        if let Some(secret) = lookup("PAYPAL_CLIENT_SECRET") {
            self.paypal.get_or_insert_with(PaypalSettings::defaults).client_secret = secret;
        }
        if let Some(id) = lookup("PAYPAL_WEBHOOK_ID") {
            self.paypal.get_or_insert_with(PaypalSettings::defaults).webhook_id = id;
        }

        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.bind_addr()?;

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be at least 1".into()));
        }
        if self.pricing.tax_rate_bps > 10_000 {
            return Err(ConfigError::Invalid("pricing.tax_rate_bps must be at most 10000".into()));
        }
        if self.pricing.free_shipping_threshold_cents < 0 || self.pricing.flat_shipping_fee_cents < 0 {
            return Err(ConfigError::Invalid("pricing amounts must not be negative".into()));
        }
        if self.storage_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("storage_retry.max_attempts must be at least 1".into()));
        }
        if self.webhook.claim_lease_secs == 0 {
            return Err(ConfigError::Invalid("webhook.claim_lease_secs must be at least 1".into()));
        }

        if let Some(stripe) = &self.stripe {
            require("stripe.api_key", &stripe.api_key)?;
            require("stripe.webhook_secret", &stripe.webhook_secret)?;
        }
        if let Some(paypal) = &self.paypal {
            require("paypal.client_id", &paypal.client_id)?;
            require("paypal.client_secret", &paypal.client_secret)?;
            require("paypal.webhook_id", &paypal.webhook_id)?;
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> ConfigResult<SocketAddr> {
        SocketAddr::from_str(&self.server.bind_addr).map_err(|_| ConfigError::InvalidValue {
            key: "server.bind_addr".into(),
            value: self.server.bind_addr.clone(),
        })
    }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy::new(
            TaxRate::from_bps(self.pricing.tax_rate_bps),
            Money::from_cents(self.pricing.free_shipping_threshold_cents),
            Money::from_cents(self.pricing.flat_shipping_fee_cents),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.storage_retry.max_attempts,
            Duration::from_millis(self.storage_retry.initial_backoff_ms),
        )
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .retry_policy(self.retry_policy())
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.webhook.claim_lease_secs)
    }
}

impl StripeSettings {
    fn defaults() -> Self {
        StripeSettings {
            api_base: default_stripe_api_base(),
            currency: default_stripe_currency(),
            ..Default::default()
        }
    }

    pub fn gateway_config(&self) -> StripeConfig {
        StripeConfig {
            api_key: self.api_key.clone(),
            api_base: self.api_base.clone(),
            currency: self.currency.to_lowercase(),
        }
    }
}

impl PaypalSettings {
    fn defaults() -> Self {
        PaypalSettings {
            api_base: default_paypal_api_base(),
            currency: default_paypal_currency(),
            ..Default::default()
        }
    }

    pub fn gateway_config(&self) -> PaypalConfig {
        PaypalConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            webhook_id: self.webhook_id.clone(),
            api_base: self.api_base.clone(),
            currency: self.currency.to_uppercase(),
            return_url: self.return_url.clone(),
            cancel_url: self.cancel_url.clone(),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{}{}", ENV_PREFIX, key),
        value: value.to_string(),
    })
}

fn require(key: &str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingRequired(key.to_string()));
    }
    Ok(())
}

// =============================================================================
// Errors
// =============================================================================

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();

        assert_eq!(config.pricing_policy(), PricingPolicy::default());
        assert_eq!(config.claim_lease(), Duration::from_secs(60));
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert!(config.stripe.is_none());
    }

    #[test]
    fn test_toml_sections() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            bind_addr = "127.0.0.1:9000"

            [pricing]
            tax_rate_bps = 1000

            [stripe]
            api_key = "sk_test_123"
            webhook_secret = "whsec_123"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.bind_addr().unwrap().port(), 9000);
        assert_eq!(config.pricing.tax_rate_bps, 1000);
        assert_eq!(config.pricing.flat_shipping_fee_cents, 999);

        let stripe = config.stripe.unwrap();
        assert_eq!(stripe.api_base, STRIPE_API_BASE);
        assert_eq!(stripe.gateway_config().currency, "usd");
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(lookup(&[
                ("BIND_ADDR", "127.0.0.1:7000"),
                ("TAX_RATE_BPS", "825"),
                ("PAYPAL_CLIENT_ID", "client"),
                ("PAYPAL_CLIENT_SECRET", "secret"),
                ("PAYPAL_WEBHOOK_ID", "WH-1"),
            ]))
            .unwrap();

        config.validate().unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:7000");
        assert_eq!(config.pricing.tax_rate_bps, 825);

        let paypal = config.paypal.unwrap();
        assert_eq!(paypal.api_base, PAYPAL_API_BASE);
        assert_eq!(paypal.currency, "USD");
    }

    #[test]
    fn test_unparseable_override_is_an_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(lookup(&[("TAX_RATE_BPS", "eight")]))
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "CHECKSTAND_TAX_RATE_BPS"));
    }

    #[test]
    fn test_half_configured_provider_is_rejected() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(lookup(&[("STRIPE_API_KEY", "sk_test_123")]))
            .unwrap();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(ref key)) if key == "stripe.webhook_secret"
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.server.bind_addr = "not-an-addr".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pricing.tax_rate_bps = 20_000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.webhook.claim_lease_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let settings = StripeSettings {
            api_key: "sk_live_very_secret".into(),
            webhook_secret: "whsec_very_secret".into(),
            ..StripeSettings::defaults()
        };

        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("very_secret"));
    }
}
