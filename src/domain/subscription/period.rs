//! Billing period arithmetic.

use serde::{Deserialize, Serialize};

use crate::domain::billing::BillingCycle;
use crate::domain::foundation::Timestamp;

/// How a billing cycle is turned into a period length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodArithmetic {
    /// One / twelve calendar months, clamped to the end of shorter months.
    #[default]
    Calendar,
    /// Thirty / 365 days.
    FixedDays,
}

/// Computes the end of the period that starts at `start`.
pub fn period_end(cycle: BillingCycle, start: Timestamp, arithmetic: PeriodArithmetic) -> Timestamp {
    match (arithmetic, cycle) {
        (PeriodArithmetic::Calendar, BillingCycle::Monthly) => start.add_calendar_months(1),
        (PeriodArithmetic::Calendar, BillingCycle::Annual) => start.add_calendar_months(12),
        (PeriodArithmetic::FixedDays, BillingCycle::Monthly) => start.add_days(30),
        (PeriodArithmetic::FixedDays, BillingCycle::Annual) => start.add_days(365),
    }
}
