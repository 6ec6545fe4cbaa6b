//! ExpireSubscriptionsHandler - sweeps subscriptions whose period has ended.

use std::sync::Arc;

use crate::application::services::SubscriptionManager;
use crate::domain::billing::BillingError;
use crate::domain::foundation::{SubscriptionId, Timestamp};

/// Default rows per batch when the caller has no preference.
pub const DEFAULT_EXPIRY_BATCH_SIZE: u32 = 100;

/// Command to expire every subscription whose period ended before `now`.
#[derive(Debug, Clone)]
pub struct ExpireSubscriptionsCommand {
    pub now: Timestamp,
    pub batch_size: u32,
}

impl ExpireSubscriptionsCommand {
    pub fn at(now: Timestamp) -> Self {
        Self {
            now,
            batch_size: DEFAULT_EXPIRY_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpireSubscriptionsResult {
    pub expired: Vec<SubscriptionId>,
}

/// Handler for the expiry sweep.
///
/// Safe to run concurrently with itself and with cancellations: each expiry
/// is a conditional write and only the winner re-syncs entitlements.
pub struct ExpireSubscriptionsHandler {
    subscriptions: Arc<SubscriptionManager>,
}

impl ExpireSubscriptionsHandler {
    pub fn new(subscriptions: Arc<SubscriptionManager>) -> Self {
        Self { subscriptions }
    }

    pub async fn handle(&self, cmd: ExpireSubscriptionsCommand) -> Result<ExpireSubscriptionsResult, BillingError> {
        if cmd.batch_size == 0 {
            return Err(BillingError::validation("batch_size", "must be at least 1"));
        }

        let expired = self.subscriptions.expire_due(cmd.now, cmd.batch_size).await?;
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expiry sweep finished");
        }

        Ok(ExpireSubscriptionsResult {
            expired: expired.into_iter().map(|s| s.id).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::BillingFixture;
    use super::*;
    use crate::domain::entitlement::EntitlementSet;
    use crate::domain::subscription::SubscriptionStatus;

    #[tokio::test]
    async fn expires_lapsed_subscription_and_revokes() {
        let f = BillingFixture::new();
        f.completed_checkout().await;
        let active = f.active_subscription().await.unwrap();
        let after_end = active.current_period_end.add_days(1);

        let result = f.expire.handle(ExpireSubscriptionsCommand::at(after_end)).await.unwrap();

        assert_eq!(result.expired, vec![active.id.clone()]);
        assert!(f.active_subscription().await.is_none());
        let history = f.subscriptions.history_for(&f.user).await.unwrap();
        assert_eq!(history[0].status, SubscriptionStatus::Expired);
        assert_eq!(f.entitlements().await, EntitlementSet::free());
    }

    #[tokio::test]
    async fn running_subscription_is_untouched() {
        let f = BillingFixture::new();
        f.completed_checkout().await;

        let result = f
            .expire
            .handle(ExpireSubscriptionsCommand::at(Timestamp::now()))
            .await
            .unwrap();

        assert!(result.expired.is_empty());
        assert!(f.active_subscription().await.is_some());
    }

    #[tokio::test]
    async fn second_sweep_finds_nothing() {
        let f = BillingFixture::new();
        f.completed_checkout().await;
        let end = f.active_subscription().await.unwrap().current_period_end.add_days(1);

        f.expire.handle(ExpireSubscriptionsCommand::at(end)).await.unwrap();
        let again = f.expire.handle(ExpireSubscriptionsCommand::at(end)).await.unwrap();

        assert!(again.expired.is_empty());
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let f = BillingFixture::new();
        let err = f
            .expire
            .handle(ExpireSubscriptionsCommand {
                now: Timestamp::now(),
                batch_size: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::ValidationFailed { .. }));
    }
}
