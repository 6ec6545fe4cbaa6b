//! Configured exchange rates held in memory.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::billing::Currency;
use crate::domain::foundation::DomainError;
use crate::ports::ExchangeRateSource;

/// Fixed USD exchange rates, e.g. from configuration.
///
/// Rates can be changed at runtime, which tests use to show that stored
/// snapshots do not move.
#[derive(Default)]
pub struct FixedRateSource {
    rates: RwLock<HashMap<Currency, f64>>,
}

impl FixedRateSource {
    pub fn new(rates: HashMap<Currency, f64>) -> Self {
        Self {
            rates: RwLock::new(rates),
        }
    }

    pub async fn set_rate(&self, currency: Currency, rate: f64) {
        self.rates.write().await.insert(currency, rate);
    }
}

#[async_trait]
impl ExchangeRateSource for FixedRateSource {
    async fn usd_rate(&self, currency: Currency) -> Result<Option<f64>, DomainError> {
        Ok(self.rates.read().await.get(&currency).copied())
    }
}
