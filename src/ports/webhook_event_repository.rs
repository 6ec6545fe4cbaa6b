//! WebhookEventRepository port - tracks processed gateway webhooks.
//!
//! Gateways deliver at least once: network timeouts, non-2xx answers and
//! lost acknowledgements all cause redelivery. This store absorbs the
//! duplicates before they reach the purchase ledger.
//!
//! Records are keyed by `(gateway, event_id)`, so two gateways may reuse
//! the same event id without colliding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::billing::GatewayKind;
use crate::domain::foundation::{DomainError, Timestamp};

/// How processing of a recorded event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventResult {
    Success,
    Ignored,
    Failed,
}

impl WebhookEventResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventResult::Success => "success",
            WebhookEventResult::Ignored => "ignored",
            WebhookEventResult::Failed => "failed",
        }
    }
}

impl fmt::Display for WebhookEventResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookEventResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(WebhookEventResult::Success),
            "ignored" => Ok(WebhookEventResult::Ignored),
            "failed" => Ok(WebhookEventResult::Failed),
            other => Err(format!("unknown webhook result '{}'", other)),
        }
    }
}

/// Record of a processed webhook event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    pub gateway: GatewayKind,
    pub event_id: String,
    /// Normalized event type, e.g. `payment.captured`.
    pub event_type: String,
    pub processed_at: Timestamp,
    pub result: WebhookEventResult,
    /// Reason for ignored or failed events.
    pub error_message: Option<String>,
    /// Original event payload for debugging.
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    pub fn success(
        gateway: GatewayKind,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            gateway,
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at: Timestamp::now(),
            result: WebhookEventResult::Success,
            error_message: None,
            payload,
        }
    }

    pub fn ignored(
        gateway: GatewayKind,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            result: WebhookEventResult::Ignored,
            error_message: Some(reason.into()),
            ..Self::success(gateway, event_id, event_type, payload)
        }
    }

    pub fn failed(
        gateway: GatewayKind,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        error: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            result: WebhookEventResult::Failed,
            error_message: Some(error.into()),
            ..Self::success(gateway, event_id, event_type, payload)
        }
    }
}

/// Result of attempting to save a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record was inserted (first time seeing this event).
    Inserted,
    /// Record already exists (duplicate event).
    AlreadyExists,
}

/// Port for storing and retrieving processed webhook events.
///
/// Implementations should use a store-level uniqueness guarantee on
/// `(gateway, event_id)` so concurrent deliveries cannot both insert.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Find a previously processed event.
    async fn find(
        &self,
        gateway: GatewayKind,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Save a record with `ON CONFLICT DO NOTHING` semantics.
    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError>;

    /// Delete records processed before `cutoff`. Returns the number deleted.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_record_has_correct_fields() {
        let record = WebhookEventRecord::success(
            GatewayKind::PayPal,
            "WH-123",
            "payment.captured",
            json!({"id": "test"}),
        );

        assert_eq!(record.gateway, GatewayKind::PayPal);
        assert_eq!(record.event_id, "WH-123");
        assert_eq!(record.result, WebhookEventResult::Success);
        assert!(record.error_message.is_none());
    }

    #[test]
    fn ignored_record_includes_reason() {
        let record = WebhookEventRecord::ignored(
            GatewayKind::Aps,
            "evt_456",
            "customer.updated",
            "unhandled event type",
            json!({}),
        );

        assert_eq!(record.result, WebhookEventResult::Ignored);
        assert_eq!(record.error_message.as_deref(), Some("unhandled event type"));
    }

    #[test]
    fn failed_record_includes_error() {
        let record = WebhookEventRecord::failed(
            GatewayKind::HyperPay,
            "evt_789",
            "payment.refunded",
            "refund for unknown order",
            json!({}),
        );

        assert_eq!(record.result, WebhookEventResult::Failed);
        assert_eq!(record.event_type, "payment.refunded");
    }

    #[test]
    fn result_parses_its_own_names() {
        for result in [
            WebhookEventResult::Success,
            WebhookEventResult::Ignored,
            WebhookEventResult::Failed,
        ] {
            assert_eq!(result.as_str().parse::<WebhookEventResult>().unwrap(), result);
        }
        assert!("retry".parse::<WebhookEventResult>().is_err());
    }
}
