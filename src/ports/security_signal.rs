//! Security signal port - consumed by intrusion detection.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::billing::GatewayKind;
use crate::domain::foundation::Timestamp;

/// A webhook failed its authenticity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecuritySignal {
    pub gateway: GatewayKind,
    pub source_ip: Option<String>,
    pub reason: String,
    pub occurred_at: Timestamp,
}

/// Receives security signals. Delivery is best-effort and never fails the
/// webhook acknowledgement.
#[async_trait]
pub trait SecuritySignalSink: Send + Sync {
    async fn emit(&self, signal: SecuritySignal);
}
