//! Application configuration module
//!
//! Configuration is read from environment variables with the
//! `BILLING_RECONCILER` prefix; nested values are separated by `__`.
//!
//! # Example
//!
//! ```no_run
//! use billing_reconciler::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod currency;
mod database;
mod error;
mod payment;
mod redis;
mod server;
mod webhook;

pub use currency::CurrencyConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::{ApsSettings, HyperPaySettings, PayPalSettings, PaymentConfig};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};
pub use webhook::WebhookConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// PostgreSQL stores. Without it, state lives in memory.
    pub database: Option<DatabaseConfig>,

    /// Redis webhook dedupe. Without it, dedupe uses the purchase store.
    pub redis: Option<RedisConfig>,

    /// Gateway credentials and billing timings
    #[serde(default)]
    pub payment: PaymentConfig,

    /// Exchange rates against USD
    #[serde(default)]
    pub currency: CurrencyConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// - `BILLING_RECONCILER__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `BILLING_RECONCILER__PAYMENT__PAYPAL__CLIENT_ID=...` -> `payment.paypal.client_id`
    /// - `BILLING_RECONCILER__CURRENCY__RATES__SAR=3.75` -> `currency.rates["sar"]`
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BILLING_RECONCILER")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// Production additionally requires a database; in-memory state does not
    /// survive a restart.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        } else if self.is_production() {
            return Err(ValidationError::MissingRequired("database.url"));
        }
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        self.payment.validate()?;
        self.currency.validate()?;
        self.webhook.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
