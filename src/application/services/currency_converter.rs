//! CurrencyConverter - freezes a USD list price into a settlement amount.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Currency, Money, PriceSnapshot};
use crate::domain::foundation::Timestamp;
use crate::ports::ExchangeRateSource;

/// Reads the live rate once and captures it into a [`PriceSnapshot`].
///
/// The snapshot is the only rate any later refund math sees.
pub struct CurrencyConverter {
    rates: Arc<dyn ExchangeRateSource>,
}

impl CurrencyConverter {
    pub fn new(rates: Arc<dyn ExchangeRateSource>) -> Self {
        Self { rates }
    }

    /// Converts `base` (USD) into `settlement` at the current rate.
    ///
    /// USD settlement uses 1.0 without asking the rate source.
    pub async fn snapshot(
        &self,
        base: Money,
        settlement: Currency,
        at: Timestamp,
    ) -> Result<(Money, PriceSnapshot), BillingError> {
        if base.currency() != Currency::Usd {
            return Err(BillingError::validation("amount", "base price must be in USD"));
        }

        let rate = if settlement == Currency::Usd {
            1.0
        } else {
            self.rates
                .usd_rate(settlement)
                .await?
                .ok_or(BillingError::ExchangeRateUnavailable(settlement))?
        };

        PriceSnapshot::capture(base, rate, settlement, at).map_err(|e| {
            tracing::warn!(currency = %settlement, rate, error = %e, "Rejected exchange rate");
            BillingError::ExchangeRateUnavailable(settlement)
        })
    }
}
