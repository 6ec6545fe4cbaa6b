//! PostgreSQL implementation of SubscriptionRepository.
//!
//! The partial unique index `subscriptions_one_active_per_user` is what keeps
//! a user at one active subscription; inserts that hit it report
//! `ActiveExists` instead of failing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{db_error, parse_column};
use crate::domain::foundation::{DomainError, OrderId, SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{Subscription, SubscriptionEnd};
use crate::ports::{InsertOutcome, SubscriptionRepository};

const ONE_ACTIVE_PER_USER: &str = "subscriptions_one_active_per_user";

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, user_id, purchase_id, plan, billing_cycle, status,
    current_period_start, current_period_end, entitlements,
    cancellation_reason, ended_at, created_at, updated_at
"#;

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<Subscription>, DomainError> {
        let sql = format!("SELECT {} FROM subscriptions WHERE {}", SUBSCRIPTION_COLUMNS, clause);
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find subscription", e))?;
        row.map(Subscription::try_from).transpose()
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    purchase_id: String,
    plan: String,
    billing_cycle: String,
    status: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    entitlements: Vec<String>,
    cancellation_reason: Option<String>,
    ended_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id)
                .map_err(|e| DomainError::database(format!("Invalid user_id: {}", e)))?,
            purchase_id: parse_column::<OrderId>("purchase_id", &row.purchase_id)?,
            plan: parse_column("plan", &row.plan)?,
            billing_cycle: parse_column("billing_cycle", &row.billing_cycle)?,
            status: parse_column("status", &row.status)?,
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            entitlements: row.entitlements,
            cancellation_reason: row
                .cancellation_reason
                .as_deref()
                .map(|r| parse_column("cancellation_reason", r))
                .transpose()?,
            ended_at: row.ended_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn insert_active(&self, subscription: &Subscription) -> Result<InsertOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, purchase_id, plan, billing_cycle, status,
                current_period_start, current_period_end, entitlements,
                cancellation_reason, ended_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, 'active', $6, $7, $8, NULL, NULL, $9, $10)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_str())
        .bind(subscription.purchase_id.as_str())
        .bind(subscription.plan.as_str())
        .bind(subscription.billing_cycle.as_str())
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(&subscription.entitlements)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db_err)) if db_err.constraint() == Some(ONE_ACTIVE_PER_USER) => {
                Ok(InsertOutcome::ActiveExists)
            }
            Err(e) => Err(db_error("Failed to insert subscription", e)),
        }
    }

    async fn find_active_by_user(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        self.fetch_one_where("user_id = $1 AND status = 'active'", user_id.as_str())
            .await
    }

    async fn find_by_purchase(&self, order_id: &OrderId) -> Result<Option<Subscription>, DomainError> {
        self.fetch_one_where("purchase_id = $1", order_id.as_str()).await
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
            SUBSCRIPTION_COLUMNS
        );
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list subscriptions", e))?;
        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn end_if_active(
        &self,
        id: &SubscriptionId,
        end: &SubscriptionEnd,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            r#"
            UPDATE subscriptions SET
                status = $2,
                cancellation_reason = $3,
                ended_at = $4,
                updated_at = $4
            WHERE id = $1 AND status = 'active'
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .bind(end.status.as_str())
            .bind(end.reason.map(|r| r.as_str()))
            .bind(end.at.as_datetime())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to end subscription", e))?;
        row.map(Subscription::try_from).transpose()
    }

    async fn find_active_ending_before(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError> {
        let sql = format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE status = 'active' AND current_period_end <= $1
            ORDER BY current_period_end
            LIMIT $2
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(cutoff.as_datetime())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list expiring subscriptions", e))?;
        rows.into_iter().map(Subscription::try_from).collect()
    }
}
