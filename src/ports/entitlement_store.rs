//! Entitlement store port.
//!
//! Holds the last computed set per user. Written only as a consequence of
//! subscription transitions.

use async_trait::async_trait;

use crate::domain::entitlement::{EntitlementGrant, UserRole};
use crate::domain::foundation::{DomainError, UserId};

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Overwrite the user's stored set.
    async fn put(&self, grant: &EntitlementGrant) -> Result<(), DomainError>;

    async fn get(&self, user_id: &UserId) -> Result<Option<EntitlementGrant>, DomainError>;
}

/// Read-only view of user roles, owned by the account subsystem.
#[async_trait]
pub trait UserRoleReader: Send + Sync {
    async fn role_of(&self, user_id: &UserId) -> Result<UserRole, DomainError>;
}
