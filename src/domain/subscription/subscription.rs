//! Subscription aggregate.

use serde::{Deserialize, Serialize};

use super::period::{period_end, PeriodArithmetic};
use super::status::{CancellationReason, SubscriptionStatus};
use crate::domain::billing::{BillingCycle, PlanType, Purchase};
use crate::domain::entitlement::EntitlementSet;
use crate::domain::foundation::{OrderId, StateMachine, SubscriptionId, Timestamp, UserId};

/// A billing-period-scoped grant funded by one completed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    /// Back-reference to the funding purchase.
    pub purchase_id: OrderId,
    pub plan: PlanType,
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    /// Tokens granted when the subscription was activated.
    pub entitlements: Vec<String>,
    pub cancellation_reason: Option<CancellationReason>,
    /// When the subscription left `active`, by cancellation or expiry.
    pub ended_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Builds the active subscription a completed purchase funds.
    pub fn from_purchase(purchase: &Purchase, now: Timestamp, arithmetic: PeriodArithmetic) -> Self {
        Self {
            id: SubscriptionId::new(),
            user_id: purchase.user_id.clone(),
            purchase_id: purchase.order_id.clone(),
            plan: purchase.plan,
            billing_cycle: purchase.billing_cycle,
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: period_end(purchase.billing_cycle, now, arithmetic),
            entitlements: EntitlementSet::for_plan(purchase.plan).tokens(),
            cancellation_reason: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// True once the current period has run out.
    pub fn is_past_period_end(&self, now: &Timestamp) -> bool {
        !now.is_before(&self.current_period_end)
    }

    /// Applies an ending if the subscription is still active.
    ///
    /// Returns `false` without changes when it has already ended.
    pub fn apply_end(&mut self, end: &SubscriptionEnd) -> bool {
        if !self.status.can_transition_to(&end.status) {
            return false;
        }
        self.status = end.status;
        self.cancellation_reason = end.reason;
        self.ended_at = Some(end.at);
        self.updated_at = end.at;
        true
    }
}

/// How an active subscription stops: cancelled with a reason, or expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionEnd {
    pub status: SubscriptionStatus,
    pub reason: Option<CancellationReason>,
    pub at: Timestamp,
}

impl SubscriptionEnd {
    pub fn cancelled(reason: CancellationReason, at: Timestamp) -> Self {
        Self {
            status: SubscriptionStatus::Cancelled,
            reason: Some(reason),
            at,
        }
    }

    pub fn expired(at: Timestamp) -> Self {
        Self {
            status: SubscriptionStatus::Expired,
            reason: None,
            at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::test_support::pending_purchase;
    use crate::domain::billing::Currency;

    #[test]
    fn from_purchase_copies_plan_and_grants_tokens() {
        let purchase = pending_purchase(Currency::Usd, 1.0);
        let now = Timestamp::now();
        let sub = Subscription::from_purchase(&purchase, now, PeriodArithmetic::Calendar);

        assert!(sub.is_active());
        assert_eq!(sub.plan, PlanType::Intermediate);
        assert_eq!(sub.purchase_id, purchase.order_id);
        assert_eq!(sub.current_period_start, now);
        assert_eq!(sub.current_period_end, now.add_calendar_months(1));
        assert!(sub.entitlements.contains(&"track:intermediate".to_string()));
    }

    #[test]
    fn apply_end_only_fires_once() {
        let purchase = pending_purchase(Currency::Usd, 1.0);
        let mut sub = Subscription::from_purchase(&purchase, Timestamp::now(), PeriodArithmetic::Calendar);

        let cancel = SubscriptionEnd::cancelled(CancellationReason::Superseded, Timestamp::now());
        assert!(sub.apply_end(&cancel));
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert_eq!(sub.cancellation_reason, Some(CancellationReason::Superseded));

        let again = SubscriptionEnd::cancelled(CancellationReason::Refunded, Timestamp::now());
        assert!(!sub.apply_end(&again));
        assert_eq!(sub.cancellation_reason, Some(CancellationReason::Superseded));
        assert!(!sub.apply_end(&SubscriptionEnd::expired(Timestamp::now())));
    }

    #[test]
    fn past_period_end_is_inclusive() {
        let purchase = pending_purchase(Currency::Usd, 1.0);
        let start = Timestamp::now();
        let sub = Subscription::from_purchase(&purchase, start, PeriodArithmetic::FixedDays);

        assert!(!sub.is_past_period_end(&start.add_days(29)));
        assert!(sub.is_past_period_end(&start.add_days(30)));
    }
}
