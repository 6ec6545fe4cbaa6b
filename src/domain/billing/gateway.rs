//! Identifiers for the supported payment gateways.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Which external gateway produced a purchase or webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    PayPal,
    HyperPay,
    Aps,
}

impl GatewayKind {
    pub const ALL: [GatewayKind; 3] = [GatewayKind::PayPal, GatewayKind::HyperPay, GatewayKind::Aps];

    /// Path segment and storage value for this gateway.
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::PayPal => "paypal",
            GatewayKind::HyperPay => "hyperpay",
            GatewayKind::Aps => "aps",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        GatewayKind::ALL
            .into_iter()
            .find(|g| g.as_str() == lower)
            .ok_or_else(|| ValidationError::invalid_format("gateway", format!("unknown gateway '{}'", s)))
    }
}
