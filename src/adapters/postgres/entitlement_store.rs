//! PostgreSQL implementation of EntitlementStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeSet;

use super::{db_error, from_json, parse_column, to_json};
use crate::domain::entitlement::{Entitlement, EntitlementGrant, EntitlementSet};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::EntitlementStore;

pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    user_id: String,
    plan: String,
    entitlements: Vec<String>,
    last_change: Value,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntitlementRow> for EntitlementGrant {
    type Error = DomainError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let entitlements = row
            .entitlements
            .iter()
            .map(|t| parse_column::<Entitlement>("entitlements", t))
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(EntitlementGrant {
            user_id: UserId::new(row.user_id)
                .map_err(|e| DomainError::database(format!("Invalid user_id: {}", e)))?,
            set: EntitlementSet {
                plan: parse_column("plan", &row.plan)?,
                entitlements,
            },
            last_change: from_json("last_change", row.last_change)?,
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn put(&self, grant: &EntitlementGrant) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO user_entitlements (user_id, plan, entitlements, last_change, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                entitlements = EXCLUDED.entitlements,
                last_change = EXCLUDED.last_change,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(grant.user_id.as_str())
        .bind(grant.set.plan.as_str())
        .bind(grant.set.tokens())
        .bind(to_json(&grant.last_change)?)
        .bind(grant.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to store entitlements", e))?;

        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<EntitlementGrant>, DomainError> {
        let row: Option<EntitlementRow> = sqlx::query_as(
            r#"
            SELECT user_id, plan, entitlements, last_change, updated_at
            FROM user_entitlements
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load entitlements", e))?;

        row.map(EntitlementGrant::try_from).transpose()
    }
}
