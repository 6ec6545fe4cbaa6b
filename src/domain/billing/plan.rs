//! Purchasable plans, billing cycles and their USD list prices.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::currency::{Currency, Money};
use crate::domain::foundation::ValidationError;

/// Content plan a subscription unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanType {
    /// Default plan for users without an active subscription. Not purchasable.
    Free,
    Junior,
    Intermediate,
    Senior,
    Bundle,
}

impl PlanType {
    pub const ALL: [PlanType; 5] = [
        PlanType::Free,
        PlanType::Junior,
        PlanType::Intermediate,
        PlanType::Senior,
        PlanType::Bundle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Free => "FREE",
            PlanType::Junior => "JUNIOR",
            PlanType::Intermediate => "INTERMEDIATE",
            PlanType::Senior => "SENIOR",
            PlanType::Bundle => "BUNDLE",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, PlanType::Free)
    }

    /// USD list price for this plan and cycle.
    ///
    /// | Plan | Monthly | Annual |
    /// |------|---------|--------|
    /// | JUNIOR | 9.99 | 99.90 |
    /// | INTERMEDIATE | 19.99 | 199.90 |
    /// | SENIOR | 29.99 | 299.90 |
    /// | BUNDLE | 49.99 | 499.90 |
    ///
    /// Annual is ten monthly payments. Returns `None` for FREE.
    pub fn base_price_usd(&self, cycle: BillingCycle) -> Option<Money> {
        let monthly_cents: i64 = match self {
            PlanType::Free => return None,
            PlanType::Junior => 999,
            PlanType::Intermediate => 1999,
            PlanType::Senior => 2999,
            PlanType::Bundle => 4999,
        };
        let cents = match cycle {
            BillingCycle::Monthly => monthly_cents,
            BillingCycle::Annual => monthly_cents * 10,
        };
        Money::from_minor(Currency::Usd, cents).ok()
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        PlanType::ALL
            .into_iter()
            .find(|p| p.as_str() == upper)
            .ok_or_else(|| ValidationError::invalid_format("plan_type", format!("unknown plan '{}'", s)))
    }
}

/// How often a subscription is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Annual,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Annual => "annual",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(BillingCycle::Monthly),
            "annual" | "yearly" => Ok(BillingCycle::Annual),
            other => Err(ValidationError::invalid_format(
                "billing_cycle",
                format!("unknown billing cycle '{}'", other),
            )),
        }
    }
}
