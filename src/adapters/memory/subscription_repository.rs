//! In-memory subscription repository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, OrderId, SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{Subscription, SubscriptionEnd};
use crate::ports::{InsertOutcome, SubscriptionRepository};

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn insert_active(&self, subscription: &Subscription) -> Result<InsertOutcome, DomainError> {
        let mut subs = self.subscriptions.write().await;
        let has_active = subs
            .values()
            .any(|s| s.user_id == subscription.user_id && s.is_active());
        if has_active {
            return Ok(InsertOutcome::ActiveExists);
        }
        subs.insert(subscription.id, subscription.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find_active_by_user(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .find(|s| &s.user_id == user_id && s.is_active())
            .cloned())
    }

    async fn find_by_purchase(&self, order_id: &OrderId) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .find(|s| &s.purchase_id == order_id)
            .cloned())
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
        let mut list: Vec<Subscription> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| &s.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn end_if_active(
        &self,
        id: &SubscriptionId,
        end: &SubscriptionEnd,
    ) -> Result<Option<Subscription>, DomainError> {
        let mut subs = self.subscriptions.write().await;
        match subs.get_mut(id) {
            Some(sub) => Ok(sub.apply_end(end).then(|| sub.clone())),
            None => Ok(None),
        }
    }

    async fn find_active_ending_before(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError> {
        let mut due: Vec<Subscription> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.is_active() && s.is_past_period_end(&cutoff))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.current_period_end.cmp(&b.current_period_end));
        due.truncate(limit as usize);
        Ok(due)
    }
}
