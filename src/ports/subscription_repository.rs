//! Subscription repository port.
//!
//! Rows are never deleted; ended subscriptions stay for history.
//!
//! Implementations must enforce at most one `active` row per user at the
//! store (a partial unique index in Postgres, a per-user check under the
//! write lock in memory) and end subscriptions with a conditional write
//! (`WHERE status = 'active'`).

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, OrderId, SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{Subscription, SubscriptionEnd};

/// Result of inserting an active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The user already holds an active subscription; nothing was written.
    ActiveExists,
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn insert_active(&self, subscription: &Subscription) -> Result<InsertOutcome, DomainError>;

    async fn find_active_by_user(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError>;

    /// The subscription funded by a purchase, whatever its status.
    async fn find_by_purchase(&self, order_id: &OrderId) -> Result<Option<Subscription>, DomainError>;

    /// Every subscription of the user, newest first.
    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError>;

    /// End the subscription if it is still active.
    ///
    /// Returns the updated row when this call performed the change, `None`
    /// when it was already ended (or does not exist).
    async fn end_if_active(
        &self,
        id: &SubscriptionId,
        end: &SubscriptionEnd,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Active subscriptions whose period ended at or before `cutoff`.
    async fn find_active_ending_before(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError>;
}
