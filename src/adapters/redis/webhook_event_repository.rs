//! Redis-backed webhook dedupe store for multi-instance deployments.
//!
//! Each processed event is one key holding the JSON record:
//! 1. `SET key value NX EX ttl` claims the event; a nil reply means another
//!    delivery already recorded it
//! 2. The TTL is the retention window, so old records expire on their own

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

use crate::domain::billing::GatewayKind;
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{SaveResult, WebhookEventRecord, WebhookEventRepository};

const KEY_PREFIX: &str = "billing:webhook";

#[derive(Clone)]
pub struct RedisWebhookEventRepository {
    conn: MultiplexedConnection,
    retention: Duration,
}

impl RedisWebhookEventRepository {
    pub fn new(conn: MultiplexedConnection, retention: Duration) -> Self {
        Self { conn, retention }
    }

    fn ttl_secs(&self) -> u64 {
        self.retention.as_secs().max(1)
    }
}

fn event_key(gateway: GatewayKind, event_id: &str) -> String {
    format!("{}:{}:{}", KEY_PREFIX, gateway.as_str(), event_id)
}

fn cache_error(e: redis::RedisError) -> DomainError {
    tracing::error!(error = %e, "Redis webhook store unavailable");
    DomainError::new(ErrorCode::CacheError, format!("Redis error: {}", e))
}

#[async_trait]
impl WebhookEventRepository for RedisWebhookEventRepository {
    async fn find(&self, gateway: GatewayKind, event_id: &str) -> Result<Option<WebhookEventRecord>, DomainError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(event_key(gateway, event_id)).await.map_err(cache_error)?;

        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| DomainError::new(ErrorCode::CacheError, format!("Corrupt webhook record: {}", e)))
        })
        .transpose()
    }

    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError> {
        let key = event_key(record.gateway, &record.event_id);
        let json = serde_json::to_string(&record)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, format!("Failed to encode record: {}", e)))?;

        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(json)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs())
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;

        Ok(match reply {
            Some(_) => SaveResult::Inserted,
            None => SaveResult::AlreadyExists,
        })
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        // Keys carry their own TTL.
        tracing::debug!(cutoff = %cutoff.as_datetime(), "Redis webhook records expire by TTL");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_gateway() {
        assert_eq!(event_key(GatewayKind::Aps, "PURCHASE:1:14"), "billing:webhook:aps:PURCHASE:1:14");
        assert_ne!(
            event_key(GatewayKind::PayPal, "evt-1"),
            event_key(GatewayKind::HyperPay, "evt-1")
        );
    }
}
