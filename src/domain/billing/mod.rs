//! Billing domain - purchases, prices and gateways.
//!
//! A [`Purchase`] is the authoritative record of one payment attempt. Its
//! status only moves forward (see [`PurchaseStatus`]) and its
//! [`PriceSnapshot`] is frozen at creation.

mod currency;
mod errors;
mod gateway;
mod plan;
mod purchase;
mod status;

pub use currency::{Currency, Money, PriceSnapshot};
pub use errors::BillingError;
pub use gateway::GatewayKind;
pub use plan::{BillingCycle, PlanType};
pub use purchase::{
    BillingAddress, CustomerInfo, NewPurchase, Purchase, PurchaseTransition, RefundRecord,
};
pub use status::PurchaseStatus;

#[cfg(test)]
pub(crate) use purchase::test_support;
