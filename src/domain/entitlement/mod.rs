//! Entitlement domain - content access derived from the active subscription.

mod grant;
mod tokens;

pub use grant::{EntitlementChange, EntitlementGrant};
pub use tokens::{Entitlement, EntitlementSet, UserRole};
