//! Gateway-neutral webhook event.
//!
//! Each gateway adapter translates its own payload into a [`GatewayEvent`]
//! after the signature check passes. Everything downstream works on this type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::domain::billing::{GatewayKind, Money};
use crate::domain::foundation::{OrderId, PaymentId};

/// Semantic event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GatewayEventKind {
    PaymentCaptured,
    PaymentFailed,
    PaymentRefunded,
    /// Anything else the gateway sends. Acknowledged, never acted on.
    Unknown(String),
}

impl GatewayEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            GatewayEventKind::PaymentCaptured => "payment.captured",
            GatewayEventKind::PaymentFailed => "payment.failed",
            GatewayEventKind::PaymentRefunded => "payment.refunded",
            GatewayEventKind::Unknown(raw) => raw,
        }
    }

    /// Parses a normalized event type; unrecognized values become `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "payment.captured" => GatewayEventKind::PaymentCaptured,
            "payment.failed" => GatewayEventKind::PaymentFailed,
            "payment.refunded" => GatewayEventKind::PaymentRefunded,
            other => GatewayEventKind::Unknown(other.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, GatewayEventKind::Unknown(_))
    }
}

impl fmt::Display for GatewayEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for GatewayEventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GatewayEventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(GatewayEventKind::parse(&raw))
    }
}

/// An authenticated, normalized inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub gateway: GatewayKind,
    /// Gateway's own event id, or the payment id when the gateway has none.
    /// Half of the dedupe key.
    pub event_id: String,
    pub kind: GatewayEventKind,
    /// Our order id when the gateway echoes it back.
    pub order_id: Option<OrderId>,
    pub payment_id: Option<PaymentId>,
    pub refund_id: Option<String>,
    pub refund_amount: Option<Money>,
    pub failure_reason: Option<String>,
    /// Raw body, kept for audit.
    pub payload: Value,
}

impl GatewayEvent {
    pub fn new(gateway: GatewayKind, event_id: impl Into<String>, kind: GatewayEventKind, payload: Value) -> Self {
        Self {
            gateway,
            event_id: event_id.into(),
            kind,
            order_id: None,
            payment_id: None,
            refund_id: None,
            refund_amount: None,
            failure_reason: None,
            payload,
        }
    }

    pub fn with_order_id(mut self, order_id: Option<OrderId>) -> Self {
        self.order_id = order_id;
        self
    }

    pub fn with_payment_id(mut self, payment_id: Option<PaymentId>) -> Self {
        self.payment_id = payment_id;
        self
    }

    pub fn with_refund(mut self, refund_id: Option<String>, amount: Option<Money>) -> Self {
        self.refund_id = refund_id;
        self.refund_amount = amount;
        self
    }

    pub fn with_failure_reason(mut self, reason: Option<String>) -> Self {
        self.failure_reason = reason;
        self
    }

    /// True when the event carries something we can locate a purchase by.
    pub fn has_reference(&self) -> bool {
        self.order_id.is_some() || self.payment_id.is_some()
    }
}
