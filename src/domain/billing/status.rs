//! Purchase status state machine.
//!
//! ```text
//! pending ──► completed ──► refunded
//!    │
//!    └──────► failed
//! ```
//!
//! Every transition has exactly one legal predecessor, so storage can guard
//! each move with a single `status = <predecessor>` predicate.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a single payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Created locally, awaiting the gateway's verdict.
    Pending,

    /// Gateway confirmed the charge. Funds a subscription.
    Completed,

    /// Gateway rejected the charge or creation failed. Dead end.
    Failed,

    /// A completed charge was returned to the customer.
    Refunded,
}

impl PurchaseStatus {
    pub const ALL: [PurchaseStatus; 4] = [
        PurchaseStatus::Pending,
        PurchaseStatus::Completed,
        PurchaseStatus::Failed,
        PurchaseStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Failed => "failed",
            PurchaseStatus::Refunded => "refunded",
        }
    }

    /// Status a purchase must currently hold for a move into `target`.
    pub fn guard_for(target: PurchaseStatus) -> Option<PurchaseStatus> {
        Self::required_predecessor(target, &Self::ALL)
    }
}

impl StateMachine for PurchaseStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PurchaseStatus::*;
        matches!(
            (self, target),
            (Pending, Completed) | (Pending, Failed) | (Completed, Refunded)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PurchaseStatus::*;
        match self {
            Pending => vec![Completed, Failed],
            Completed => vec![Refunded],
            Failed | Refunded => vec![],
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PurchaseStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid purchase status '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pending_can_complete_or_fail() {
        assert!(PurchaseStatus::Pending.can_transition_to(&PurchaseStatus::Completed));
        assert!(PurchaseStatus::Pending.can_transition_to(&PurchaseStatus::Failed));
        assert!(!PurchaseStatus::Pending.can_transition_to(&PurchaseStatus::Refunded));
    }

    #[test]
    fn completed_can_only_be_refunded() {
        assert_eq!(
            PurchaseStatus::Completed.valid_transitions(),
            vec![PurchaseStatus::Refunded]
        );
    }

    #[test]
    fn failed_and_refunded_are_terminal() {
        assert!(PurchaseStatus::Failed.is_terminal());
        assert!(PurchaseStatus::Refunded.is_terminal());
    }

    #[test]
    fn guards_name_the_single_predecessor() {
        assert_eq!(
            PurchaseStatus::guard_for(PurchaseStatus::Completed),
            Some(PurchaseStatus::Pending)
        );
        assert_eq!(
            PurchaseStatus::guard_for(PurchaseStatus::Failed),
            Some(PurchaseStatus::Pending)
        );
        assert_eq!(
            PurchaseStatus::guard_for(PurchaseStatus::Refunded),
            Some(PurchaseStatus::Completed)
        );
        assert_eq!(PurchaseStatus::guard_for(PurchaseStatus::Pending), None);
    }

    #[test]
    fn parses_storage_values() {
        for status in PurchaseStatus::ALL {
            assert_eq!(status.as_str().parse::<PurchaseStatus>(), Ok(status));
        }
        assert!("captured".parse::<PurchaseStatus>().is_err());
    }

    fn any_status() -> impl Strategy<Value = PurchaseStatus> {
        prop::sample::select(PurchaseStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn refunded_is_never_left(path in prop::collection::vec(any_status(), 0..12)) {
            let mut current = PurchaseStatus::Refunded;
            for target in path {
                if let Ok(next) = current.transition_to(target) {
                    current = next;
                }
            }
            prop_assert_eq!(current, PurchaseStatus::Refunded);
        }

        #[test]
        fn no_transition_returns_to_pending(from in any_status()) {
            prop_assert!(!from.can_transition_to(&PurchaseStatus::Pending));
        }
    }
}
