//! Security signal delivery.
//!
//! Signals go out as structured `tracing` events under the `security`
//! target, where the log pipeline routes them to intrusion detection.

use async_trait::async_trait;

use crate::ports::{SecuritySignal, SecuritySignalSink};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSecuritySignalSink;

impl TracingSecuritySignalSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecuritySignalSink for TracingSecuritySignalSink {
    async fn emit(&self, signal: SecuritySignal) {
        tracing::warn!(
            target: "security",
            gateway = %signal.gateway,
            source_ip = signal.source_ip.as_deref().unwrap_or("unknown"),
            reason = %signal.reason,
            occurred_at = %signal.occurred_at.as_datetime(),
            "Webhook authenticity check failed"
        );
    }
}
