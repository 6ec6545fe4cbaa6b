//! PostgreSQL implementation of PurchaseRepository.
//!
//! Status changes are single conditional UPDATEs; the row count tells the
//! caller whether it won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use super::{db_error, from_json, parse_column, to_json};
use crate::domain::billing::{Money, Purchase, PurchaseStatus, PurchaseTransition};
use crate::domain::foundation::{DomainError, ErrorCode, OrderId, PaymentId, Timestamp, UserId};
use crate::ports::{PurchaseRepository, TransitionOutcome};

const PURCHASE_COLUMNS: &str = r#"
    order_id, payment_id, user_id, gateway, plan, billing_cycle, status,
    amount_minor, currency, price_snapshot, gateway_response, customer,
    billing_address, metadata, failure_reason, refund,
    created_at, updated_at, completed_at
"#;

pub struct PostgresPurchaseRepository {
    pool: PgPool,
}

impl PostgresPurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, order_id: &OrderId) -> Result<Option<PurchaseStatus>, DomainError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM purchases WHERE order_id = $1")
            .bind(order_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to read purchase status", e))?;
        status.map(|s| parse_column("status", &s)).transpose()
    }
}

/// Database row representation of a purchase.
#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    order_id: String,
    payment_id: String,
    user_id: String,
    gateway: String,
    plan: String,
    billing_cycle: String,
    status: String,
    amount_minor: i64,
    currency: String,
    price_snapshot: Value,
    gateway_response: Option<Value>,
    customer: Value,
    billing_address: Option<Value>,
    metadata: Value,
    failure_reason: Option<String>,
    refund: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = DomainError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let currency = parse_column("currency", &row.currency)?;
        let amount = Money::from_minor(currency, row.amount_minor)
            .map_err(|e| DomainError::database(format!("Invalid amount: {}", e)))?;

        Ok(Purchase {
            order_id: parse_column::<OrderId>("order_id", &row.order_id)?,
            payment_id: parse_column::<PaymentId>("payment_id", &row.payment_id)?,
            user_id: UserId::new(row.user_id)
                .map_err(|e| DomainError::database(format!("Invalid user_id: {}", e)))?,
            gateway: parse_column("gateway", &row.gateway)?,
            plan: parse_column("plan", &row.plan)?,
            billing_cycle: parse_column("billing_cycle", &row.billing_cycle)?,
            status: parse_column("status", &row.status)?,
            amount,
            price_snapshot: from_json("price_snapshot", row.price_snapshot)?,
            gateway_response: row.gateway_response,
            customer: from_json("customer", row.customer)?,
            billing_address: row
                .billing_address
                .map(|v| from_json("billing_address", v))
                .transpose()?,
            metadata: row.metadata,
            failure_reason: row.failure_reason,
            refund: row.refund.map(|v| from_json("refund", v)).transpose()?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            completed_at: row.completed_at.map(Timestamp::from_datetime),
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl PurchaseRepository for PostgresPurchaseRepository {
    async fn insert(&self, purchase: &Purchase) -> Result<(), DomainError> {
        let billing_address = purchase.billing_address.as_ref().map(to_json).transpose()?;
        let refund = purchase.refund.as_ref().map(to_json).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO purchases (
                order_id, payment_id, user_id, gateway, plan, billing_cycle, status,
                amount_minor, currency, price_snapshot, gateway_response, customer,
                billing_address, metadata, failure_reason, refund,
                created_at, updated_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(purchase.order_id.as_str())
        .bind(purchase.payment_id.as_str())
        .bind(purchase.user_id.as_str())
        .bind(purchase.gateway.as_str())
        .bind(purchase.plan.as_str())
        .bind(purchase.billing_cycle.as_str())
        .bind(purchase.status.as_str())
        .bind(purchase.amount.minor_units())
        .bind(purchase.amount.currency().code())
        .bind(to_json(&purchase.price_snapshot)?)
        .bind(&purchase.gateway_response)
        .bind(to_json(&purchase.customer)?)
        .bind(billing_address)
        .bind(&purchase.metadata)
        .bind(&purchase.failure_reason)
        .bind(refund)
        .bind(purchase.created_at.as_datetime())
        .bind(purchase.updated_at.as_datetime())
        .bind(purchase.completed_at.as_ref().map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DomainError::new(
                    ErrorCode::DuplicatePurchase,
                    format!("Purchase {} already exists", purchase.order_id),
                );
            }
            db_error("Failed to insert purchase", e)
        })?;

        Ok(())
    }

    async fn apply_transition(
        &self,
        order_id: &OrderId,
        transition: &PurchaseTransition,
    ) -> Result<TransitionOutcome, DomainError> {
        let refund = transition.refund.as_ref().map(to_json).transpose()?;
        let sql = format!(
            r#"
            UPDATE purchases SET
                status = $3,
                updated_at = $4,
                gateway_response = COALESCE($5, gateway_response),
                completed_at = CASE WHEN $3 = 'completed' THEN $4 ELSE completed_at END,
                failure_reason = CASE WHEN $3 = 'failed' THEN $6 ELSE failure_reason END,
                refund = CASE WHEN $3 = 'refunded' THEN $7 ELSE refund END
            WHERE order_id = $1 AND status = $2
            RETURNING {}
            "#,
            PURCHASE_COLUMNS
        );

        let row: Option<PurchaseRow> = sqlx::query_as(&sql)
            .bind(order_id.as_str())
            .bind(transition.expected_from().as_str())
            .bind(transition.target.as_str())
            .bind(transition.at.as_datetime())
            .bind(&transition.gateway_response)
            .bind(&transition.failure_reason)
            .bind(refund)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to apply purchase transition", e))?;

        if let Some(row) = row {
            return Ok(TransitionOutcome::Applied(row.try_into()?));
        }

        match self.current_status(order_id).await? {
            Some(current) => Ok(TransitionOutcome::Rejected { current }),
            None => Ok(TransitionOutcome::NotFound),
        }
    }

    async fn assign_payment_id(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
        gateway_response: Option<&Value>,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE purchases SET
                payment_id = $2,
                gateway_response = COALESCE($3, gateway_response)
            WHERE order_id = $1 AND payment_id = order_id
            "#,
        )
        .bind(order_id.as_str())
        .bind(payment_id.as_str())
        .bind(gateway_response)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DomainError::new(
                    ErrorCode::DuplicatePurchase,
                    format!("Payment id {} is already assigned", payment_id),
                );
            }
            db_error("Failed to assign payment id", e)
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Option<Purchase>, DomainError> {
        let sql = format!("SELECT {} FROM purchases WHERE order_id = $1", PURCHASE_COLUMNS);
        let row: Option<PurchaseRow> = sqlx::query_as(&sql)
            .bind(order_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find purchase", e))?;
        row.map(Purchase::try_from).transpose()
    }

    async fn find_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Purchase>, DomainError> {
        let sql = format!("SELECT {} FROM purchases WHERE payment_id = $1", PURCHASE_COLUMNS);
        let row: Option<PurchaseRow> = sqlx::query_as(&sql)
            .bind(payment_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find purchase", e))?;
        row.map(Purchase::try_from).transpose()
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Purchase>, DomainError> {
        let sql = format!(
            "SELECT {} FROM purchases WHERE user_id = $1 ORDER BY created_at DESC",
            PURCHASE_COLUMNS
        );
        let rows: Vec<PurchaseRow> = sqlx::query_as(&sql)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list purchases", e))?;
        rows.into_iter().map(Purchase::try_from).collect()
    }
}
