//! SubscriptionManager - subscription lifecycle driven by purchase outcomes.
//!
//! ```text
//! active ──► cancelled (superseded | refunded | user_requested | administrative)
//!    │
//!    └─────► expired   (period end passed)
//! ```
//!
//! Every ending is a conditional write on `status = active`; only the call
//! that actually ended the subscription touches entitlements, and it
//! re-syncs them from whatever is active afterwards rather than blindly
//! revoking.

use std::sync::Arc;

use super::entitlement_resolver::EntitlementResolver;
use crate::domain::billing::Purchase;
use crate::domain::foundation::{DomainError, ErrorCode, OrderId, Timestamp, UserId};
use crate::domain::subscription::{CancellationReason, PeriodArithmetic, Subscription, SubscriptionEnd};
use crate::ports::{InsertOutcome, SubscriptionRepository};

/// Attempts at cancel-then-insert before giving up on a contended user.
const MAX_ACTIVATION_ATTEMPTS: u32 = 3;

pub struct SubscriptionManager {
    subscriptions: Arc<dyn SubscriptionRepository>,
    entitlements: Arc<EntitlementResolver>,
    arithmetic: PeriodArithmetic,
}

impl SubscriptionManager {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        entitlements: Arc<EntitlementResolver>,
        arithmetic: PeriodArithmetic,
    ) -> Self {
        Self {
            subscriptions,
            entitlements,
            arithmetic,
        }
    }

    /// Starts the subscription a newly completed purchase pays for.
    ///
    /// Any active subscription of the same user is cancelled as superseded
    /// before the new one is stored and its plan
    /// granted. Calling this again for the same purchase returns the
    /// subscription created the first time.
    pub async fn activate(&self, purchase: &Purchase) -> Result<Subscription, DomainError> {
        if let Some(existing) = self.subscriptions.find_by_purchase(&purchase.order_id).await? {
            tracing::debug!(order_id = %purchase.order_id, subscription_id = %existing.id, "Subscription already exists");
            return Ok(existing);
        }

        for attempt in 1..=MAX_ACTIVATION_ATTEMPTS {
            let now = Timestamp::now();
            if let Some(current) = self.subscriptions.find_active_by_user(&purchase.user_id).await? {
                if current.purchase_id == purchase.order_id {
                    // A concurrent activation of this purchase got there first
                    return Ok(current);
                }
                self.end(&current, SubscriptionEnd::cancelled(CancellationReason::Superseded, now))
                    .await?;
            }

            let subscription = Subscription::from_purchase(purchase, now, self.arithmetic);
            match self.subscriptions.insert_active(&subscription).await? {
                InsertOutcome::Inserted => {
                    self.entitlements.sync(&subscription.user_id, "activated").await?;
                    tracing::info!(
                        user_id = %subscription.user_id,
                        subscription_id = %subscription.id,
                        plan = %subscription.plan,
                        period_end = %subscription.current_period_end,
                        "Subscription activated"
                    );
                    return Ok(subscription);
                }
                InsertOutcome::ActiveExists => {
                    tracing::warn!(
                        user_id = %purchase.user_id,
                        order_id = %purchase.order_id,
                        attempt,
                        "Another active subscription appeared, retrying"
                    );
                }
            }
        }

        Err(DomainError::new(
            ErrorCode::ActiveSubscriptionExists,
            format!("Could not activate subscription for purchase {}", purchase.order_id),
        )
        .with_detail("user_id", purchase.user_id.to_string()))
    }

    /// Cancels an active subscription.
    ///
    /// Returns `None` when it had already ended; cancelling twice is a no-op.
    pub async fn cancel(
        &self,
        subscription: &Subscription,
        reason: CancellationReason,
    ) -> Result<Option<Subscription>, DomainError> {
        self.end(subscription, SubscriptionEnd::cancelled(reason, Timestamp::now()))
            .await
    }

    /// Cancels whatever subscription `order_id` funded, if it is still active.
    pub async fn cancel_for_purchase(
        &self,
        order_id: &OrderId,
        reason: CancellationReason,
    ) -> Result<Option<Subscription>, DomainError> {
        match self.subscriptions.find_by_purchase(order_id).await? {
            Some(subscription) => self.cancel(&subscription, reason).await,
            None => {
                tracing::debug!(order_id = %order_id, "No subscription to cancel for purchase");
                Ok(None)
            }
        }
    }

    /// Expires active subscriptions whose period ended at or before `now`.
    ///
    /// Works through batches of `batch_size` until none are left.
    pub async fn expire_due(&self, now: Timestamp, batch_size: u32) -> Result<Vec<Subscription>, DomainError> {
        let batch_size = batch_size.max(1);
        let mut expired = Vec::new();

        loop {
            let due = self.subscriptions.find_active_ending_before(now, batch_size).await?;
            let fetched = due.len();
            for subscription in due {
                if let Some(ended) = self.end(&subscription, SubscriptionEnd::expired(now)).await? {
                    expired.push(ended);
                }
            }
            if fetched < batch_size as usize {
                break;
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired subscriptions");
        }
        Ok(expired)
    }

    pub async fn active_for(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        self.subscriptions.find_active_by_user(user_id).await
    }

    /// All subscriptions of the user, newest first.
    pub async fn history_for(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
        self.subscriptions.list_by_user(user_id).await
    }

    async fn end(
        &self,
        subscription: &Subscription,
        end: SubscriptionEnd,
    ) -> Result<Option<Subscription>, DomainError> {
        let Some(ended) = self.subscriptions.end_if_active(&subscription.id, &end).await? else {
            tracing::debug!(subscription_id = %subscription.id, "Subscription already ended");
            return Ok(None);
        };

        let reason = end
            .reason
            .map(|r| r.as_str())
            .unwrap_or_else(|| ended.status.as_str());
        self.entitlements.sync(&ended.user_id, reason).await?;

        tracing::info!(
            user_id = %ended.user_id,
            subscription_id = %ended.id,
            status = %ended.status,
            reason,
            "Subscription ended"
        );
        Ok(Some(ended))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryEntitlementStore, InMemorySubscriptionRepository, StaticUserRoleReader,
    };
    use crate::domain::billing::test_support::pending_purchase;
    use crate::domain::billing::{Currency, PlanType};
    use crate::domain::entitlement::{EntitlementChange, EntitlementGrant, EntitlementSet};
    use crate::domain::subscription::SubscriptionStatus;
    use crate::ports::EntitlementStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::Notify;

    // ════════════════════════════════════════════════════════════════════════════
    // Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    struct Fixture {
        subscriptions: Arc<dyn SubscriptionRepository>,
        resolver: Arc<EntitlementResolver>,
        manager: SubscriptionManager,
    }

    fn fixture_with(subscriptions: Arc<dyn SubscriptionRepository>) -> Fixture {
        let resolver = Arc::new(EntitlementResolver::new(
            Arc::new(InMemoryEntitlementStore::new()),
            Arc::new(StaticUserRoleReader::default()),
            subscriptions.clone(),
        ));
        let manager = SubscriptionManager::new(subscriptions.clone(), resolver.clone(), PeriodArithmetic::Calendar);
        Fixture {
            subscriptions,
            resolver,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemorySubscriptionRepository::new()))
    }

    fn purchase_for(user: &Purchase, plan: PlanType) -> Purchase {
        let mut next = pending_purchase(Currency::Usd, 1.0);
        next.user_id = user.user_id.clone();
        next.plan = plan;
        next
    }

    /// Reports `ActiveExists` for the first N inserts.
    struct ContendedRepository {
        inner: InMemorySubscriptionRepository,
        conflicts_left: AtomicU32,
    }

    #[async_trait]
    impl SubscriptionRepository for ContendedRepository {
        async fn insert_active(&self, subscription: &Subscription) -> Result<InsertOutcome, DomainError> {
            let left = self.conflicts_left.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts_left.store(left - 1, Ordering::SeqCst);
                return Ok(InsertOutcome::ActiveExists);
            }
            self.inner.insert_active(subscription).await
        }

        async fn find_active_by_user(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
            self.inner.find_active_by_user(user_id).await
        }

        async fn find_by_purchase(&self, order_id: &OrderId) -> Result<Option<Subscription>, DomainError> {
            self.inner.find_by_purchase(order_id).await
        }

        async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
            self.inner.list_by_user(user_id).await
        }

        async fn end_if_active(
            &self,
            id: &crate::domain::foundation::SubscriptionId,
            end: &SubscriptionEnd,
        ) -> Result<Option<Subscription>, DomainError> {
            self.inner.end_if_active(id, end).await
        }

        async fn find_active_ending_before(
            &self,
            cutoff: Timestamp,
            limit: u32,
        ) -> Result<Vec<Subscription>, DomainError> {
            self.inner.find_active_ending_before(cutoff, limit).await
        }
    }

    fn contended(conflicts: u32) -> Arc<dyn SubscriptionRepository> {
        Arc::new(ContendedRepository {
            inner: InMemorySubscriptionRepository::new(),
            conflicts_left: AtomicU32::new(conflicts),
        })
    }

    /// Parks the first revoke written after arming until released.
    struct HeldRevokeStore {
        inner: InMemoryEntitlementStore,
        armed: AtomicBool,
        parked: Notify,
        release: Notify,
    }

    impl HeldRevokeStore {
        fn new() -> Self {
            Self {
                inner: InMemoryEntitlementStore::new(),
                armed: AtomicBool::new(false),
                parked: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl EntitlementStore for HeldRevokeStore {
        async fn put(&self, grant: &EntitlementGrant) -> Result<(), DomainError> {
            let revoking = matches!(grant.last_change, EntitlementChange::Revoked { .. });
            if revoking && self.armed.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            self.inner.put(grant).await
        }

        async fn get(&self, user_id: &UserId) -> Result<Option<EntitlementGrant>, DomainError> {
            self.inner.get(user_id).await
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Activation
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn activate_creates_active_subscription_and_grants() {
        let f = fixture();
        let purchase = pending_purchase(Currency::Usd, 1.0);

        let sub = f.manager.activate(&purchase).await.unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.purchase_id, purchase.order_id);
        assert_eq!(
            f.resolver.resolve(&purchase.user_id).await.unwrap(),
            EntitlementSet::for_plan(purchase.plan)
        );
    }

    #[tokio::test]
    async fn activate_is_idempotent_per_purchase() {
        let f = fixture();
        let purchase = pending_purchase(Currency::Usd, 1.0);

        let first = f.manager.activate(&purchase).await.unwrap();
        let second = f.manager.activate(&purchase).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(f.subscriptions.list_by_user(&purchase.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_purchase_supersedes_previous_subscription() {
        let f = fixture();
        let senior = purchase_for(&pending_purchase(Currency::Usd, 1.0), PlanType::Senior);
        let bundle = purchase_for(&senior, PlanType::Bundle);

        let old = f.manager.activate(&senior).await.unwrap();
        let new = f.manager.activate(&bundle).await.unwrap();

        let history = f.manager.history_for(&senior.user_id).await.unwrap();
        let old_now = history.iter().find(|s| s.id == old.id).unwrap();
        assert_eq!(old_now.status, SubscriptionStatus::Cancelled);
        assert_eq!(old_now.cancellation_reason, Some(CancellationReason::Superseded));
        assert_eq!(f.manager.active_for(&senior.user_id).await.unwrap().unwrap().id, new.id);
        assert_eq!(
            f.resolver.resolve(&senior.user_id).await.unwrap(),
            EntitlementSet::for_plan(PlanType::Bundle)
        );
    }

    #[tokio::test]
    async fn activate_retries_when_insert_loses_a_race() {
        let f = fixture_with(contended(2));
        let purchase = pending_purchase(Currency::Usd, 1.0);

        let sub = f.manager.activate(&purchase).await.unwrap();
        assert!(sub.is_active());
    }

    #[tokio::test]
    async fn activate_gives_up_after_bounded_attempts() {
        let f = fixture_with(contended(MAX_ACTIVATION_ATTEMPTS));
        let purchase = pending_purchase(Currency::Usd, 1.0);

        let err = f.manager.activate(&purchase).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ActiveSubscriptionExists);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Cancellation and Expiry
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn cancel_twice_is_a_noop() {
        let f = fixture();
        let purchase = pending_purchase(Currency::Usd, 1.0);
        let sub = f.manager.activate(&purchase).await.unwrap();

        let first = f.manager.cancel(&sub, CancellationReason::UserRequested).await.unwrap();
        let second = f.manager.cancel(&sub, CancellationReason::UserRequested).await.unwrap();

        assert_eq!(first.unwrap().status, SubscriptionStatus::Cancelled);
        assert!(second.is_none());
        assert_eq!(f.resolver.resolve(&purchase.user_id).await.unwrap(), EntitlementSet::free());
    }

    #[tokio::test]
    async fn refund_of_superseded_purchase_keeps_current_entitlements() {
        let f = fixture();
        let junior = purchase_for(&pending_purchase(Currency::Usd, 1.0), PlanType::Junior);
        let senior = purchase_for(&junior, PlanType::Senior);
        f.manager.activate(&junior).await.unwrap();
        f.manager.activate(&senior).await.unwrap();

        let cancelled = f
            .manager
            .cancel_for_purchase(&junior.order_id, CancellationReason::Refunded)
            .await
            .unwrap();

        assert!(cancelled.is_none());
        assert_eq!(
            f.resolver.resolve(&junior.user_id).await.unwrap(),
            EntitlementSet::for_plan(PlanType::Senior)
        );
    }

    #[tokio::test]
    async fn cancel_for_unknown_purchase_is_a_noop() {
        let f = fixture();
        let result = f
            .manager
            .cancel_for_purchase(&OrderId::generate(), CancellationReason::Refunded)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn expire_due_works_through_batches() {
        let f = fixture();
        let lapsed = pending_purchase(Currency::Usd, 1.0);
        let mut other = pending_purchase(Currency::Usd, 1.0);
        other.user_id = UserId::new("user-2").unwrap();
        let lapsed_sub = f.manager.activate(&lapsed).await.unwrap();
        f.manager.activate(&other).await.unwrap();

        let later = Timestamp::now().add_calendar_months(2);
        let expired = f.manager.expire_due(later, 1).await.unwrap();

        assert_eq!(expired.len(), 2);
        assert!(expired.iter().any(|s| s.id == lapsed_sub.id));
        assert!(expired.iter().all(|s| s.status == SubscriptionStatus::Expired));
        assert_eq!(f.resolver.resolve(&lapsed.user_id).await.unwrap(), EntitlementSet::free());
    }

    #[tokio::test]
    async fn expire_due_leaves_running_periods_alone() {
        let f = fixture();
        let purchase = pending_purchase(Currency::Usd, 1.0);
        f.manager.activate(&purchase).await.unwrap();

        let expired = f.manager.expire_due(Timestamp::now(), 50).await.unwrap();

        assert!(expired.is_empty());
        assert!(f.manager.active_for(&purchase.user_id).await.unwrap().is_some());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Entitlement consistency
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn late_revoke_of_refunded_subscription_keeps_newer_plan() {
        let store = Arc::new(HeldRevokeStore::new());
        let subscriptions: Arc<dyn SubscriptionRepository> = Arc::new(InMemorySubscriptionRepository::new());
        let resolver = Arc::new(EntitlementResolver::new(
            store.clone(),
            Arc::new(StaticUserRoleReader::default()),
            subscriptions.clone(),
        ));
        let manager = Arc::new(SubscriptionManager::new(
            subscriptions.clone(),
            resolver.clone(),
            PeriodArithmetic::Calendar,
        ));
        let senior = purchase_for(&pending_purchase(Currency::Usd, 1.0), PlanType::Senior);
        let bundle = purchase_for(&senior, PlanType::Bundle);
        manager.activate(&senior).await.unwrap();

        store.armed.store(true, Ordering::SeqCst);
        let refund = {
            let manager = manager.clone();
            let order_id = senior.order_id.clone();
            tokio::spawn(async move {
                manager
                    .cancel_for_purchase(&order_id, CancellationReason::Refunded)
                    .await
            })
        };

        // The refund has ended the senior subscription and is about to write
        // the free set; the bundle purchase activates in between.
        store.parked.notified().await;
        manager.activate(&bundle).await.unwrap();
        store.release.notify_one();
        let cancelled = refund.await.unwrap().unwrap();

        assert_eq!(cancelled.unwrap().status, SubscriptionStatus::Cancelled);
        let active = manager.active_for(&senior.user_id).await.unwrap().unwrap();
        assert_eq!(active.plan, PlanType::Bundle);
        assert_eq!(
            resolver.resolve(&senior.user_id).await.unwrap(),
            EntitlementSet::for_plan(PlanType::Bundle)
        );
    }
}
