//! State machine trait for lifecycle status enums.
//!
//! Purchases and subscriptions both move through small, forward-only
//! lifecycles. This trait gives them one vocabulary for asking whether a
//! move is legal before a conditional write is attempted against storage.

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for PurchaseStatus {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         matches!((self, target), (Pending, Completed) | (Pending, Failed) | (Completed, Refunded))
///     }
///
///     fn valid_transitions(&self) -> Vec<Self> { ... }
/// }
///
/// let next = PurchaseStatus::Pending.transition_to(PurchaseStatus::Completed)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    /// The single state a guarded move into `target` must start from.
    ///
    /// Every lifecycle in this crate has at most one legal predecessor per
    /// target, which is what lets storage express the guard as
    /// `WHERE status = <predecessor>`.
    fn required_predecessor(target: Self, all: &[Self]) -> Option<Self> {
        all.iter().copied().find(|s| s.can_transition_to(&target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TicketStatus {
        Open,
        Resolved,
        Closed,
        Rejected,
    }

    const ALL: [TicketStatus; 4] = [
        TicketStatus::Open,
        TicketStatus::Resolved,
        TicketStatus::Closed,
        TicketStatus::Rejected,
    ];

    impl StateMachine for TicketStatus {
        fn can_transition_to(&self, target: &Self) -> bool {
            use TicketStatus::*;
            matches!(
                (self, target),
                (Open, Resolved) | (Open, Rejected) | (Resolved, Closed)
            )
        }

        fn valid_transitions(&self) -> Vec<Self> {
            use TicketStatus::*;
            match self {
                Open => vec![Resolved, Rejected],
                Resolved => vec![Closed],
                Closed | Rejected => vec![],
            }
        }
    }

    #[test]
    fn transition_to_succeeds_for_valid_transition() {
        assert_eq!(
            TicketStatus::Open.transition_to(TicketStatus::Resolved),
            Ok(TicketStatus::Resolved)
        );
    }

    #[test]
    fn transition_to_fails_for_backward_transition() {
        assert!(TicketStatus::Closed.transition_to(TicketStatus::Open).is_err());
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        assert!(TicketStatus::Closed.is_terminal());
        assert!(TicketStatus::Rejected.is_terminal());
        assert!(!TicketStatus::Open.is_terminal());
    }

    #[test]
    fn required_predecessor_finds_unique_source() {
        assert_eq!(
            TicketStatus::required_predecessor(TicketStatus::Closed, &ALL),
            Some(TicketStatus::Resolved)
        );
        assert_eq!(
            TicketStatus::required_predecessor(TicketStatus::Rejected, &ALL),
            Some(TicketStatus::Open)
        );
        assert_eq!(TicketStatus::required_predecessor(TicketStatus::Open, &ALL), None);
    }

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        for status in ALL {
            for target in status.valid_transitions() {
                assert!(status.can_transition_to(&target));
            }
        }
    }
}
