//! Currencies, money amounts and the purchase-time price snapshot.
//!
//! Amounts are held as integer minor units. Conversion from the USD base
//! price happens exactly once, when a purchase is created, and the rate used
//! is frozen into a [`PriceSnapshot`] so that later rate drift cannot change
//! what a refund is worth.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Timestamp, ValidationError};

/// Settlement currencies the gateways can charge in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Sar,
    Aed,
    Egp,
    Kwd,
}

impl Currency {
    pub const ALL: [Currency; 7] = [
        Currency::Usd,
        Currency::Eur,
        Currency::Gbp,
        Currency::Sar,
        Currency::Aed,
        Currency::Egp,
        Currency::Kwd,
    ];

    /// ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Sar => "SAR",
            Currency::Aed => "AED",
            Currency::Egp => "EGP",
            Currency::Kwd => "KWD",
        }
    }

    /// Number of decimal places in the minor unit.
    pub fn minor_unit_exponent(&self) -> u32 {
        match self {
            Currency::Kwd => 3,
            _ => 2,
        }
    }

    fn minor_per_major(&self) -> i64 {
        10_i64.pow(self.minor_unit_exponent())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Currency::ALL
            .into_iter()
            .find(|c| c.code() == upper)
            .ok_or_else(|| {
                ValidationError::invalid_format("currency", format!("unsupported currency '{}'", s))
            })
    }
}

/// An amount of money in a specific currency, stored in minor units.
///
/// Serialized as `{"currency": "SAR", "value": "74.96"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "MoneyRepr", try_from = "MoneyRepr")]
pub struct Money {
    currency: Currency,
    minor_units: i64,
}

impl Money {
    /// Creates a non-negative amount from minor units.
    pub fn from_minor(currency: Currency, minor_units: i64) -> Result<Self, ValidationError> {
        if minor_units < 0 {
            return Err(ValidationError::out_of_range(
                "amount",
                0,
                i64::MAX,
                minor_units,
            ));
        }
        Ok(Self {
            currency,
            minor_units,
        })
    }

    /// Parses a decimal string such as `"19.99"` in the given currency.
    ///
    /// Rejects signs, exponents and more fractional digits than the
    /// currency's minor unit allows.
    pub fn parse_decimal(currency: Currency, value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        let invalid = |reason: &str| ValidationError::invalid_format("amount", reason.to_string());

        let (whole, fraction) = match value.split_once('.') {
            Some((w, f)) => (w, f),
            None => (value, ""),
        };
        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a plain decimal number"));
        }
        if !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a plain decimal number"));
        }
        let exponent = currency.minor_unit_exponent() as usize;
        if fraction.len() > exponent {
            return Err(invalid("too many decimal places for currency"));
        }

        let whole: i64 = whole.parse().map_err(|_| invalid("amount too large"))?;
        let padded = format!("{:0<width$}", fraction, width = exponent);
        let fraction: i64 = if padded.is_empty() {
            0
        } else {
            padded.parse().map_err(|_| invalid("invalid fraction"))?
        };

        let minor = whole
            .checked_mul(currency.minor_per_major())
            .and_then(|m| m.checked_add(fraction))
            .ok_or_else(|| invalid("amount too large"))?;

        Self::from_minor(currency, minor)
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn minor_units(&self) -> i64 {
        self.minor_units
    }

    pub fn is_zero(&self) -> bool {
        self.minor_units == 0
    }

    /// Formats the amount as a decimal string with the currency's precision.
    pub fn to_decimal_string(&self) -> String {
        let exponent = self.currency.minor_unit_exponent() as usize;
        let per_major = self.currency.minor_per_major();
        format!(
            "{}.{:0width$}",
            self.minor_units / per_major,
            self.minor_units % per_major,
            width = exponent
        )
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal_string(), self.currency)
    }
}

#[derive(Serialize, Deserialize)]
struct MoneyRepr {
    currency: Currency,
    value: String,
}

impl From<Money> for MoneyRepr {
    fn from(money: Money) -> Self {
        Self {
            currency: money.currency,
            value: money.to_decimal_string(),
        }
    }
}

impl TryFrom<MoneyRepr> for Money {
    type Error = ValidationError;

    fn try_from(repr: MoneyRepr) -> Result<Self, Self::Error> {
        Money::parse_decimal(repr.currency, &repr.value)
    }
}

/// Immutable currency context captured when a purchase is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// List price in USD.
    pub base_currency_amount: Money,
    /// Units of settlement currency per 1 USD at capture time.
    pub exchange_rate_used: f64,
    pub settlement_currency: Currency,
    pub captured_at: Timestamp,
}

impl PriceSnapshot {
    /// Converts a USD base price at `rate` and freezes the result.
    ///
    /// Returns the settlement amount together with the snapshot describing
    /// how it was derived.
    pub fn capture(
        base: Money,
        rate: f64,
        settlement_currency: Currency,
        captured_at: Timestamp,
    ) -> Result<(Money, Self), ValidationError> {
        if base.currency() != Currency::Usd {
            return Err(ValidationError::invalid_format(
                "base_currency_amount",
                "base price must be in USD",
            ));
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ValidationError::invalid_format(
                "exchange_rate",
                format!("rate must be a positive number, got {}", rate),
            ));
        }

        let snapshot = Self {
            base_currency_amount: base,
            exchange_rate_used: rate,
            settlement_currency,
            captured_at,
        };
        let charged = snapshot.settlement_amount_for(&base)?;
        Ok((charged, snapshot))
    }

    /// Converts a USD amount into the settlement currency at the frozen rate.
    ///
    /// Rounds half away from zero to the settlement currency's minor unit.
    pub fn settlement_amount_for(&self, base: &Money) -> Result<Money, ValidationError> {
        if base.currency() != Currency::Usd {
            return Err(ValidationError::invalid_format(
                "amount",
                "expected a USD amount",
            ));
        }
        let usd = Currency::Usd;
        let scale = self.settlement_currency.minor_per_major() as f64 / usd.minor_per_major() as f64;
        let converted = (base.minor_units() as f64 * self.exchange_rate_used * scale).round();
        if !converted.is_finite() || converted > i64::MAX as f64 {
            return Err(ValidationError::invalid_format("amount", "conversion overflow"));
        }
        Money::from_minor(self.settlement_currency, converted as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn usd(minor: i64) -> Money {
        Money::from_minor(Currency::Usd, minor).unwrap()
    }

    #[test]
    fn currency_parses_case_insensitively() {
        assert_eq!("sar".parse::<Currency>().unwrap(), Currency::Sar);
        assert_eq!(" KWD ".parse::<Currency>().unwrap(), Currency::Kwd);
        assert!("XYZ".parse::<Currency>().is_err());
    }

    #[test]
    fn money_formats_with_currency_precision() {
        assert_eq!(usd(1999).to_decimal_string(), "19.99");
        assert_eq!(usd(5).to_decimal_string(), "0.05");
        let kwd = Money::from_minor(Currency::Kwd, 6150).unwrap();
        assert_eq!(kwd.to_decimal_string(), "6.150");
    }

    #[test]
    fn money_parses_decimal_strings() {
        assert_eq!(Money::parse_decimal(Currency::Usd, "19.99").unwrap(), usd(1999));
        assert_eq!(Money::parse_decimal(Currency::Usd, "20").unwrap(), usd(2000));
        assert_eq!(Money::parse_decimal(Currency::Usd, "0.5").unwrap(), usd(50));
    }

    #[test]
    fn money_rejects_malformed_decimals() {
        assert!(Money::parse_decimal(Currency::Usd, "-1.00").is_err());
        assert!(Money::parse_decimal(Currency::Usd, "1.999").is_err());
        assert!(Money::parse_decimal(Currency::Usd, "1e3").is_err());
        assert!(Money::parse_decimal(Currency::Usd, ".50").is_err());
        assert!(Money::parse_decimal(Currency::Usd, "").is_err());
    }

    #[test]
    fn money_serializes_as_currency_and_value() {
        let json = serde_json::to_value(usd(1999)).unwrap();
        assert_eq!(json, serde_json::json!({"currency": "USD", "value": "19.99"}));
        let back: Money = serde_json::from_value(json).unwrap();
        assert_eq!(back, usd(1999));
    }

    #[test]
    fn snapshot_converts_at_captured_rate() {
        let (charged, snapshot) =
            PriceSnapshot::capture(usd(1999), 3.75, Currency::Sar, Timestamp::now()).unwrap();
        // 19.99 * 3.75 = 74.9625 -> 74.96
        assert_eq!(charged.minor_units(), 7496);
        assert_eq!(charged.currency(), Currency::Sar);
        assert_eq!(snapshot.exchange_rate_used, 3.75);
        assert_eq!(snapshot.base_currency_amount, usd(1999));
    }

    #[test]
    fn snapshot_handles_three_decimal_currencies() {
        let (charged, _) =
            PriceSnapshot::capture(usd(1999), 0.3075, Currency::Kwd, Timestamp::now()).unwrap();
        // 19.99 * 0.3075 = 6.146925 -> 6.147
        assert_eq!(charged.minor_units(), 6147);
    }

    #[test]
    fn snapshot_rejects_non_positive_rates() {
        assert!(PriceSnapshot::capture(usd(100), 0.0, Currency::Eur, Timestamp::now()).is_err());
        assert!(PriceSnapshot::capture(usd(100), -1.0, Currency::Eur, Timestamp::now()).is_err());
        assert!(
            PriceSnapshot::capture(usd(100), f64::NAN, Currency::Eur, Timestamp::now()).is_err()
        );
    }

    #[test]
    fn snapshot_requires_usd_base() {
        let eur = Money::from_minor(Currency::Eur, 100).unwrap();
        assert!(PriceSnapshot::capture(eur, 1.0, Currency::Sar, Timestamp::now()).is_err());
    }

    proptest! {
        #[test]
        fn identity_rate_preserves_amount(minor in 0i64..10_000_000) {
            let (charged, _) =
                PriceSnapshot::capture(usd(minor), 1.0, Currency::Usd, Timestamp::now()).unwrap();
            prop_assert_eq!(charged.minor_units(), minor);
        }

        #[test]
        fn partial_refund_never_exceeds_full_conversion(
            full in 1i64..1_000_000,
            part in 0i64..1_000_000,
            rate in 0.01f64..500.0,
        ) {
            let part = part.min(full);
            let (charged, snapshot) =
                PriceSnapshot::capture(usd(full), rate, Currency::Sar, Timestamp::now()).unwrap();
            let refund = snapshot.settlement_amount_for(&usd(part)).unwrap();
            prop_assert!(refund.minor_units() <= charged.minor_units());
        }

        #[test]
        fn decimal_string_round_trips(minor in 0i64..1_000_000_000) {
            let money = usd(minor);
            let parsed = Money::parse_decimal(Currency::Usd, &money.to_decimal_string()).unwrap();
            prop_assert_eq!(parsed, money);
        }
    }
}
