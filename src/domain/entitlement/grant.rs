//! Stored entitlement state for one user.

use serde::{Deserialize, Serialize};

use super::tokens::EntitlementSet;
use crate::domain::billing::PlanType;
use crate::domain::foundation::{Timestamp, UserId};

/// The last change made to a user's stored set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntitlementChange {
    Granted { plan: PlanType },
    Revoked { reason: String },
}

/// A user's current entitlement set plus the audit trail of how it got there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementGrant {
    pub user_id: UserId,
    pub set: EntitlementSet,
    pub last_change: EntitlementChange,
    pub updated_at: Timestamp,
}

impl EntitlementGrant {
    pub fn granted(user_id: UserId, plan: PlanType, at: Timestamp) -> Self {
        Self {
            user_id,
            set: EntitlementSet::for_plan(plan),
            last_change: EntitlementChange::Granted { plan },
            updated_at: at,
        }
    }

    /// Back to the free set. The reason is kept for audit only.
    pub fn revoked(user_id: UserId, reason: impl Into<String>, at: Timestamp) -> Self {
        Self {
            user_id,
            set: EntitlementSet::free(),
            last_change: EntitlementChange::Revoked {
                reason: reason.into(),
            },
            updated_at: at,
        }
    }
}
