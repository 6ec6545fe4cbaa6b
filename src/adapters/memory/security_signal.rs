//! Security signals collected in memory.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::ports::{SecuritySignal, SecuritySignalSink};

/// Keeps every emitted signal; tests read them back with `signals`.
#[derive(Default)]
pub struct InMemorySecuritySignalSink {
    signals: Mutex<Vec<SecuritySignal>>,
}

impl InMemorySecuritySignalSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<SecuritySignal> {
        self.signals
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SecuritySignalSink for InMemorySecuritySignalSink {
    async fn emit(&self, signal: SecuritySignal) {
        if let Ok(mut signals) = self.signals.lock() {
            signals.push(signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::GatewayKind;
    use crate::domain::foundation::Timestamp;

    #[tokio::test]
    async fn signal_sink_records_in_order() {
        let sink = InMemorySecuritySignalSink::new();
        for ip in ["10.0.0.1", "10.0.0.2"] {
            sink.emit(SecuritySignal {
                gateway: GatewayKind::PayPal,
                source_ip: Some(ip.into()),
                reason: "Invalid signature".into(),
                occurred_at: Timestamp::now(),
            })
            .await;
        }

        let signals = sink.signals();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[1].source_ip.as_deref(), Some("10.0.0.2"));
    }
}
