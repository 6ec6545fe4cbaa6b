//! Payment gateway configuration
//!
//! Each gateway section is optional. A missing section leaves that gateway
//! unconfigured: its requests fail with `NotConfigured` while the others
//! keep working.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::gateways::{ApsConfig, HyperPayConfig, PayPalConfig};
use crate::domain::subscription::PeriodArithmetic;

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub paypal: Option<PayPalSettings>,
    pub hyperpay: Option<HyperPaySettings>,
    pub aps: Option<ApsSettings>,

    /// Whole-request budget for outbound gateway calls, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How billing cycles map to period lengths
    #[serde(default)]
    pub period_arithmetic: PeriodArithmetic,

    /// How often the expiry sweep runs, in seconds
    #[serde(default = "default_expiry_sweep_interval")]
    pub expiry_sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalSettings {
    pub client_id: String,
    pub client_secret: SecretString,
    pub webhook_secret: SecretString,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HyperPaySettings {
    pub access_token: SecretString,
    pub entity_id: String,
    pub webhook_secret: SecretString,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApsSettings {
    pub merchant_identifier: String,
    pub access_code: SecretString,
    /// SHA request phrase
    pub request_secret: SecretString,
    /// SHA response phrase
    pub response_secret: SecretString,
    pub language: Option<String>,
    pub base_url: Option<String>,
}

impl PaymentConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for secs in [self.request_timeout_secs, self.connect_timeout_secs] {
            if secs == 0 || secs > 120 {
                return Err(ValidationError::InvalidGatewayTimeout);
            }
        }
        if self.expiry_sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidInterval("payment.expiry_sweep_interval_secs"));
        }
        if let Some(paypal) = &self.paypal {
            paypal.validate()?;
        }
        if let Some(hyperpay) = &self.hyperpay {
            hyperpay.validate()?;
        }
        if let Some(aps) = &self.aps {
            aps.validate()?;
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            paypal: None,
            hyperpay: None,
            aps: None,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            period_arithmetic: PeriodArithmetic::default(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval(),
        }
    }
}

impl PayPalSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.client_id, "payment.paypal.client_id")?;
        require_secret(&self.client_secret, "payment.paypal.client_secret")?;
        require_secret(&self.webhook_secret, "payment.paypal.webhook_secret")?;
        check_base_url(self.base_url.as_deref(), "paypal")
    }

    pub fn adapter_config(&self) -> PayPalConfig {
        let config = PayPalConfig::new(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.webhook_secret.clone(),
        );
        match &self.base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }
}

impl HyperPaySettings {
    fn validate(&self) -> Result<(), ValidationError> {
        require_secret(&self.access_token, "payment.hyperpay.access_token")?;
        require(&self.entity_id, "payment.hyperpay.entity_id")?;
        require_secret(&self.webhook_secret, "payment.hyperpay.webhook_secret")?;
        check_base_url(self.base_url.as_deref(), "hyperpay")
    }

    pub fn adapter_config(&self) -> HyperPayConfig {
        let config = HyperPayConfig::new(
            self.access_token.clone(),
            self.entity_id.clone(),
            self.webhook_secret.clone(),
        );
        match &self.base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }
}

impl ApsSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.merchant_identifier, "payment.aps.merchant_identifier")?;
        require_secret(&self.access_code, "payment.aps.access_code")?;
        require_secret(&self.request_secret, "payment.aps.request_secret")?;
        require_secret(&self.response_secret, "payment.aps.response_secret")?;
        check_base_url(self.base_url.as_deref(), "aps")
    }

    pub fn adapter_config(&self) -> ApsConfig {
        let mut config = ApsConfig::new(
            self.merchant_identifier.clone(),
            self.access_code.clone(),
            self.request_secret.clone(),
            self.response_secret.clone(),
        );
        if let Some(language) = &self.language {
            config = config.with_language(language.clone());
        }
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.clone());
        }
        config
    }
}

fn require(value: &str, name: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingRequired(name));
    }
    Ok(())
}

fn require_secret(value: &SecretString, name: &'static str) -> Result<(), ValidationError> {
    require(value.expose_secret(), name)
}

/// Gateways are only reachable over HTTPS; plain HTTP is allowed for local stubs.
fn check_base_url(url: Option<&str>, gateway: &'static str) -> Result<(), ValidationError> {
    match url {
        None => Ok(()),
        Some(url)
            if url.starts_with("https://")
                || url.starts_with("http://localhost")
                || url.starts_with("http://127.0.0.1") =>
        {
            Ok(())
        }
        Some(_) => Err(ValidationError::InvalidGatewayUrl(gateway)),
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_expiry_sweep_interval() -> u64 {
    3600
}
