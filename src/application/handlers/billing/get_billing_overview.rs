//! GetBillingOverviewHandler - what a user has and how they got it.

use std::sync::Arc;

use crate::application::services::{EntitlementResolver, PurchaseLedger, SubscriptionManager};
use crate::domain::billing::{BillingError, Purchase};
use crate::domain::entitlement::EntitlementSet;
use crate::domain::foundation::UserId;
use crate::domain::subscription::Subscription;

/// Query for one user's billing state.
#[derive(Debug, Clone)]
pub struct GetBillingOverviewQuery {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillingOverview {
    pub user_id: UserId,
    /// Resolved set, role overlay applied.
    pub entitlements: EntitlementSet,
    pub active_subscription: Option<Subscription>,
    /// Every subscription, newest first.
    pub history: Vec<Subscription>,
    pub purchases: Vec<Purchase>,
}

pub struct GetBillingOverviewHandler {
    resolver: Arc<EntitlementResolver>,
    subscriptions: Arc<SubscriptionManager>,
    ledger: Arc<PurchaseLedger>,
}

impl GetBillingOverviewHandler {
    pub fn new(
        resolver: Arc<EntitlementResolver>,
        subscriptions: Arc<SubscriptionManager>,
        ledger: Arc<PurchaseLedger>,
    ) -> Self {
        Self {
            resolver,
            subscriptions,
            ledger,
        }
    }

    pub async fn handle(&self, query: GetBillingOverviewQuery) -> Result<BillingOverview, BillingError> {
        let entitlements = self.resolver.resolve(&query.user_id).await?;
        let active_subscription = self.subscriptions.active_for(&query.user_id).await?;
        let history = self.subscriptions.history_for(&query.user_id).await?;
        let purchases = self.ledger.list_by_user(&query.user_id).await?;

        Ok(BillingOverview {
            user_id: query.user_id,
            entitlements,
            active_subscription,
            history,
            purchases,
        })
    }
}
