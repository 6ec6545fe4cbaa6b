//! In-memory entitlement store and the static role reader it is paired with.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::domain::entitlement::{EntitlementGrant, UserRole};
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{EntitlementStore, UserRoleReader};

#[derive(Default)]
pub struct InMemoryEntitlementStore {
    grants: RwLock<HashMap<UserId, EntitlementGrant>>,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn put(&self, grant: &EntitlementGrant) -> Result<(), DomainError> {
        self.grants
            .write()
            .await
            .insert(grant.user_id.clone(), grant.clone());
        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<EntitlementGrant>, DomainError> {
        Ok(self.grants.read().await.get(user_id).cloned())
    }
}

/// Role reader backed by a static list of admin user ids.
#[derive(Debug, Default, Clone)]
pub struct StaticUserRoleReader {
    admins: HashSet<String>,
}

impl StaticUserRoleReader {
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            admins: admins.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl UserRoleReader for StaticUserRoleReader {
    async fn role_of(&self, user_id: &UserId) -> Result<UserRole, DomainError> {
        if self.admins.contains(user_id.as_str()) {
            Ok(UserRole::Admin)
        } else {
            Ok(UserRole::Student)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::PlanType;
    use crate::domain::foundation::Timestamp;

    #[tokio::test]
    async fn put_overwrites_previous_grant() {
        let store = InMemoryEntitlementStore::new();
        let user = UserId::new("u-1").unwrap();
        store
            .put(&EntitlementGrant::granted(user.clone(), PlanType::Senior, Timestamp::now()))
            .await
            .unwrap();
        store
            .put(&EntitlementGrant::revoked(user.clone(), "refunded", Timestamp::now()))
            .await
            .unwrap();

        let grant = store.get(&user).await.unwrap().unwrap();
        assert_eq!(grant.set.plan, PlanType::Free);
    }

    #[tokio::test]
    async fn static_roles() {
        let roles = StaticUserRoleReader::new(["admin-1"]);
        assert_eq!(roles.role_of(&UserId::new("admin-1").unwrap()).await.unwrap(), UserRole::Admin);
        assert_eq!(roles.role_of(&UserId::new("u-2").unwrap()).await.unwrap(), UserRole::Student);
    }
}
