//! Subscription status state machine.
//!
//! Subscriptions are born `active` and end exactly once, either by
//! cancellation (supersede, refund, user request) or by period expiry.
//! Ended rows are kept for history.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Funded and granting entitlements.
    Active,

    /// Ended early. See the cancellation reason.
    Cancelled,

    /// Ran past its current period end.
    Expired,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 3] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::Cancelled,
        SubscriptionStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!((self, target), (Active, Cancelled) | (Active, Expired))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Active => vec![Cancelled, Expired],
            Cancelled | Expired => vec![],
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid subscription status '{}'", s))
    }
}

/// Why a subscription was cancelled. Recorded for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    /// A newer purchase replaced it.
    Superseded,
    /// The funding purchase was refunded.
    Refunded,
    UserRequested,
    Administrative,
}

impl CancellationReason {
    pub const ALL: [CancellationReason; 4] = [
        CancellationReason::Superseded,
        CancellationReason::Refunded,
        CancellationReason::UserRequested,
        CancellationReason::Administrative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationReason::Superseded => "superseded",
            CancellationReason::Refunded => "refunded",
            CancellationReason::UserRequested => "user_requested",
            CancellationReason::Administrative => "administrative",
        }
    }
}

impl fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CancellationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CancellationReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| format!("invalid cancellation reason '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_can_end_either_way() {
        assert!(SubscriptionStatus::Active.can_transition_to(&SubscriptionStatus::Cancelled));
        assert!(SubscriptionStatus::Active.can_transition_to(&SubscriptionStatus::Expired));
    }

    #[test]
    fn ended_subscriptions_never_reactivate() {
        for ended in [SubscriptionStatus::Cancelled, SubscriptionStatus::Expired] {
            assert!(ended.is_terminal());
            assert!(ended.transition_to(SubscriptionStatus::Active).is_err());
        }
    }

    #[test]
    fn cancelled_cannot_become_expired() {
        assert!(!SubscriptionStatus::Cancelled.can_transition_to(&SubscriptionStatus::Expired));
    }

    #[test]
    fn reasons_parse_from_storage() {
        for reason in CancellationReason::ALL {
            assert_eq!(reason.as_str().parse::<CancellationReason>(), Ok(reason));
        }
        assert_eq!(
            serde_json::to_string(&CancellationReason::Superseded).unwrap(),
            "\"superseded\""
        );
    }
}
