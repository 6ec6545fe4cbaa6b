//! Exchange rate source port.
//!
//! Rates are read once, when a purchase is priced, and frozen into its
//! snapshot. Nothing else consults the live rate.

use async_trait::async_trait;

use crate::domain::billing::Currency;
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    /// Units of `currency` per 1 USD, or `None` when no rate is known.
    async fn usd_rate(&self, currency: Currency) -> Result<Option<f64>, DomainError>;
}
