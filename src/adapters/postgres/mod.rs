//! PostgreSQL adapters - sqlx implementations of the storage ports.
//!
//! - `PostgresPurchaseRepository` - purchases with guarded status updates
//! - `PostgresSubscriptionRepository` - single active subscription per user
//! - `PostgresEntitlementStore` - last computed entitlement set per user
//! - `PostgresWebhookEventRepository` - webhook dedupe ledger

mod entitlement_store;
mod purchase_repository;
mod subscription_repository;
mod webhook_event_repository;

pub use entitlement_store::PostgresEntitlementStore;
pub use purchase_repository::PostgresPurchaseRepository;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use crate::config::DatabaseConfig;
use crate::domain::foundation::DomainError;

/// Opens a connection pool sized and timed from config.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .connect(&config.url)
        .await
}

/// Applies the SQL files under `migrations_dir`.
pub async fn run_migrations(pool: &PgPool, migrations_dir: &Path) -> Result<(), sqlx::migrate::MigrateError> {
    let migrator = sqlx::migrate::Migrator::new(migrations_dir).await?;
    migrator.run(pool).await?;
    tracing::info!(dir = %migrations_dir.display(), "Database migrations completed");
    Ok(())
}

pub(crate) fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    tracing::error!(error = %e, "{}", context);
    DomainError::database(format!("{}: {}", context, e))
}

/// Parses a text column into a domain value.
pub(crate) fn parse_column<T>(column: &str, value: &str) -> Result<T, DomainError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| DomainError::database(format!("Invalid {} value '{}': {}", column, value, e)))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, DomainError> {
    serde_json::to_value(value).map_err(|e| DomainError::database(format!("Failed to encode JSON: {}", e)))
}

pub(crate) fn from_json<T: DeserializeOwned>(column: &str, value: Value) -> Result<T, DomainError> {
    serde_json::from_value(value).map_err(|e| DomainError::database(format!("Invalid {} JSON: {}", column, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::PurchaseStatus;
    use crate::domain::foundation::ErrorCode;

    #[test]
    fn parse_column_reads_known_values() {
        let status: PurchaseStatus = parse_column("status", "refunded").unwrap();
        assert_eq!(status, PurchaseStatus::Refunded);
    }

    #[test]
    fn parse_column_reports_column_and_value() {
        let err = parse_column::<PurchaseStatus>("status", "settled").unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(err.message.contains("status"));
        assert!(err.message.contains("settled"));
    }
}
