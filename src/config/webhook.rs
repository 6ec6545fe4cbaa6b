//! Webhook dedupe retention

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Days a processed event id is remembered
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// How often expired records are purged, in seconds
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl WebhookConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.retention_days == 0 {
            return Err(ValidationError::InvalidRetention);
        }
        if self.purge_interval_secs == 0 {
            return Err(ValidationError::InvalidInterval("webhook.purge_interval_secs"));
        }
        Ok(())
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

fn default_purge_interval() -> u64 {
    3600
}
