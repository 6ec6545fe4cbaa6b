//! Exchange rate configuration
//!
//! Rates are units of settlement currency per 1 USD, keyed by ISO code:
//! `BILLING_RECONCILER__CURRENCY__RATES__SAR=3.75`.

use serde::Deserialize;
use std::collections::HashMap;

use super::error::ValidationError;
use crate::domain::billing::Currency;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrencyConfig {
    #[serde(default)]
    pub rates: HashMap<String, f64>,
}

impl CurrencyConfig {
    /// Rates keyed by currency. Fails on unknown codes and non-positive rates.
    pub fn parsed_rates(&self) -> Result<HashMap<Currency, f64>, ValidationError> {
        self.rates
            .iter()
            .map(|(code, rate)| {
                let currency: Currency = code.parse().map_err(|_| ValidationError::InvalidExchangeRate {
                    currency: code.clone(),
                    reason: "unsupported currency".to_string(),
                })?;
                if !rate.is_finite() || *rate <= 0.0 {
                    return Err(ValidationError::InvalidExchangeRate {
                        currency: code.clone(),
                        reason: format!("rate must be positive, got {}", rate),
                    });
                }
                Ok((currency, *rate))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.parsed_rates().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rates: &[(&str, f64)]) -> CurrencyConfig {
        CurrencyConfig {
            rates: rates.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn lowercase_codes_parse() {
        let rates = config(&[("sar", 3.75), ("KWD", 0.307)]).parsed_rates().unwrap();
        assert_eq!(rates[&Currency::Sar], 3.75);
        assert_eq!(rates[&Currency::Kwd], 0.307);
    }

    #[test]
    fn unknown_currency_is_rejected() {
        assert!(matches!(
            config(&[("XYZ", 1.0)]).validate(),
            Err(ValidationError::InvalidExchangeRate { .. })
        ));
    }

    #[test]
    fn non_positive_rate_is_rejected() {
        assert!(config(&[("AED", 0.0)]).validate().is_err());
        assert!(config(&[("AED", -3.6)]).validate().is_err());
        assert!(config(&[("AED", f64::NAN)]).validate().is_err());
    }
}
