//! EntitlementResolver - the single authority for "can this user access X".
//!
//! The stored set only ever changes through `grant` and `revoke`, which
//! subscription transitions drive through `sync`. Other subsystems call
//! `resolve` and never look at subscription records directly.

use std::sync::Arc;

use crate::domain::billing::PlanType;
use crate::domain::entitlement::{EntitlementGrant, EntitlementSet};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::{EntitlementStore, SubscriptionRepository, UserRoleReader};

/// Write-then-verify rounds before `sync` settles for its last write.
const MAX_SYNC_ROUNDS: u32 = 4;

pub struct EntitlementResolver {
    store: Arc<dyn EntitlementStore>,
    roles: Arc<dyn UserRoleReader>,
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl EntitlementResolver {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        roles: Arc<dyn UserRoleReader>,
        subscriptions: Arc<dyn SubscriptionRepository>,
    ) -> Self {
        Self {
            store,
            roles,
            subscriptions,
        }
    }

    /// Overwrites the user's set with the tokens for `plan`.
    pub async fn grant(&self, user_id: &UserId, plan: PlanType) -> Result<EntitlementGrant, DomainError> {
        let grant = EntitlementGrant::granted(user_id.clone(), plan, Timestamp::now());
        self.store.put(&grant).await?;
        tracing::info!(user_id = %user_id, plan = %plan, "Entitlements granted");
        Ok(grant)
    }

    /// Drops the user back to the free set. `reason` is audit only.
    pub async fn revoke(&self, user_id: &UserId, reason: &str) -> Result<EntitlementGrant, DomainError> {
        let grant = EntitlementGrant::revoked(user_id.clone(), reason, Timestamp::now());
        self.store.put(&grant).await?;
        tracing::info!(user_id = %user_id, reason, "Entitlements revoked");
        Ok(grant)
    }

    /// Current set for the user, with the role overlay applied.
    pub async fn resolve(&self, user_id: &UserId) -> Result<EntitlementSet, DomainError> {
        let stored = self
            .store
            .get(user_id)
            .await?
            .map(|grant| grant.set)
            .unwrap_or_else(EntitlementSet::free);
        let role = self.roles.role_of(user_id).await?;
        Ok(stored.with_role(role))
    }

    /// Makes the stored set match the user's active subscription.
    ///
    /// Each write is followed by a fresh read of the active subscription; if
    /// it changed meanwhile the write is redone, so a revoke decided before a
    /// concurrent activation cannot outlive that activation's grant.
    /// `reason` is recorded when the user ends up on the free set.
    pub async fn sync(&self, user_id: &UserId, reason: &str) -> Result<EntitlementGrant, DomainError> {
        let mut active = self.active_plan(user_id).await?;
        let mut round = 1;
        loop {
            let grant = match active {
                Some(plan) => self.grant(user_id, plan).await?,
                None => self.revoke(user_id, reason).await?,
            };

            let current = self.active_plan(user_id).await?;
            if current == active {
                return Ok(grant);
            }
            if round == MAX_SYNC_ROUNDS {
                tracing::warn!(user_id = %user_id, rounds = round, "Active subscription kept changing during sync");
                return Ok(grant);
            }
            tracing::debug!(user_id = %user_id, round, "Active subscription changed during sync, rewriting");
            active = current;
            round += 1;
        }
    }

    /// Rebuilds the stored set from the active subscription.
    pub async fn recompute(&self, user_id: &UserId) -> Result<EntitlementSet, DomainError> {
        self.sync(user_id, "recomputed: no active subscription").await?;
        self.resolve(user_id).await
    }

    async fn active_plan(&self, user_id: &UserId) -> Result<Option<PlanType>, DomainError> {
        Ok(self
            .subscriptions
            .find_active_by_user(user_id)
            .await?
            .map(|subscription| subscription.plan))
    }
}
