//! PurgeWebhookEventsHandler - drops dedupe records past retention.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::Timestamp;
use crate::ports::WebhookEventRepository;

#[derive(Debug, Clone)]
pub struct PurgeWebhookEventsCommand {
    pub retention_days: u32,
    pub now: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeWebhookEventsResult {
    pub deleted: u64,
    pub cutoff: Timestamp,
}

/// Handler for webhook record retention.
///
/// Gateways stop redelivering after a few days, so records older than the
/// retention window no longer protect anything.
pub struct PurgeWebhookEventsHandler {
    events: Arc<dyn WebhookEventRepository>,
}

impl PurgeWebhookEventsHandler {
    pub fn new(events: Arc<dyn WebhookEventRepository>) -> Self {
        Self { events }
    }

    pub async fn handle(&self, cmd: PurgeWebhookEventsCommand) -> Result<PurgeWebhookEventsResult, BillingError> {
        if cmd.retention_days == 0 {
            return Err(BillingError::validation("retention_days", "must be at least 1"));
        }

        let cutoff = cmd.now.add_days(-i64::from(cmd.retention_days));
        let deleted = self.events.delete_before(cutoff).await?;
        tracing::info!(deleted, cutoff = %cutoff, "Purged webhook event records");

        Ok(PurgeWebhookEventsResult { deleted, cutoff })
    }
}
