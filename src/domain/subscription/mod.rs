//! Subscription domain - at most one active subscription per user.

mod period;
mod status;
#[allow(clippy::module_inception)]
mod subscription;

pub use period::{period_end, PeriodArithmetic};
pub use status::{CancellationReason, SubscriptionStatus};
pub use subscription::{Subscription, SubscriptionEnd};
