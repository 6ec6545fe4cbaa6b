//! WebhookIngestor - authenticated, idempotent processing of gateway webhooks.
//!
//! Order of operations:
//! 1. Signature check (before any field of the body is trusted)
//! 2. Dedupe lookup on `(gateway, event_id)`
//! 3. Route by event kind through the shared reconciler
//! 4. Record the outcome, unless the failure was transient
//!
//! Every path produces a `WebhookAck`; the HTTP layer always answers 200.

use serde::Serialize;
use std::sync::Arc;

use crate::application::services::{GatewayRegistry, PaymentReconciler, ReconcileOutcome};
use crate::domain::billing::{GatewayKind, Purchase, PurchaseStatus, RefundRecord};
use crate::domain::foundation::{RefundId, Timestamp};
use crate::domain::webhook::{GatewayEvent, GatewayEventKind, WebhookError};
use crate::ports::{
    SaveResult, SecuritySignal, SecuritySignalSink, WebhookEventRecord, WebhookEventRepository, WebhookRequest,
};

/// Command carrying one raw inbound webhook.
#[derive(Debug, Clone)]
pub struct IngestWebhookCommand {
    pub gateway: GatewayKind,
    pub request: WebhookRequest,
}

/// What happened to a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The event was applied (or was a guarded no-op) and recorded.
    Processed,
    /// Already recorded; nothing done.
    Duplicate,
    /// Authentic but not actionable: unknown type or unknown purchase.
    Ignored,
    /// Signature check failed; nothing done.
    Unauthenticated,
    /// The gateway has no configuration here.
    NotConfigured,
    /// Authentic but unreadable body.
    Malformed,
    /// Processing failed.
    Failed,
}

/// Acknowledgement body returned to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    /// False when the event was not taken in, either because processing
    /// failed or because the sender could not be trusted.
    pub accepted: bool,
    pub outcome: WebhookOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl WebhookAck {
    fn new(accepted: bool, outcome: WebhookOutcome, event_id: Option<String>) -> Self {
        Self {
            accepted,
            outcome,
            event_id,
        }
    }

    /// Ack for a path segment that names no known gateway.
    pub fn unknown_gateway() -> Self {
        Self::new(false, WebhookOutcome::NotConfigured, None)
    }
}

/// Result of routing one event, before it is recorded.
enum Routed {
    Applied,
    Ignored(String),
    /// Left unrecorded so a later copy of the event is processed.
    Deferred(String),
}

pub struct WebhookIngestor {
    gateways: Arc<GatewayRegistry>,
    reconciler: Arc<PaymentReconciler>,
    events: Arc<dyn WebhookEventRepository>,
    signals: Arc<dyn SecuritySignalSink>,
}

impl WebhookIngestor {
    pub fn new(
        gateways: Arc<GatewayRegistry>,
        reconciler: Arc<PaymentReconciler>,
        events: Arc<dyn WebhookEventRepository>,
        signals: Arc<dyn SecuritySignalSink>,
    ) -> Self {
        Self {
            gateways,
            reconciler,
            events,
            signals,
        }
    }

    /// Processes a webhook. Never fails: the outcome is in the ack.
    pub async fn ingest(&self, cmd: IngestWebhookCommand) -> WebhookAck {
        // 1. Gateway must be configured
        let gateway = match self.gateways.get(cmd.gateway) {
            Ok(gateway) => gateway,
            Err(_) => {
                tracing::warn!(gateway = %cmd.gateway, "Webhook for unconfigured gateway");
                return WebhookAck::new(false, WebhookOutcome::NotConfigured, None);
            }
        };

        // 2. Authenticate and normalize
        let event = match gateway.verify_webhook(&cmd.request) {
            Ok(event) => event,
            Err(e) if e.is_authentication_failure() => {
                tracing::warn!(
                    gateway = %cmd.gateway,
                    source_ip = cmd.request.source_ip.as_deref().unwrap_or("unknown"),
                    error = %e,
                    "Webhook signature rejected"
                );
                self.signals
                    .emit(SecuritySignal {
                        gateway: cmd.gateway,
                        source_ip: cmd.request.source_ip.clone(),
                        reason: e.to_string(),
                        occurred_at: Timestamp::now(),
                    })
                    .await;
                return WebhookAck::new(false, WebhookOutcome::Unauthenticated, None);
            }
            Err(e) => {
                tracing::warn!(gateway = %cmd.gateway, error = %e, "Webhook body unreadable");
                return WebhookAck::new(false, WebhookOutcome::Malformed, None);
            }
        };

        // 3. Dedupe
        match self.events.find(event.gateway, &event.event_id).await {
            Ok(Some(existing)) => {
                tracing::info!(
                    gateway = %event.gateway,
                    event_id = %event.event_id,
                    result = %existing.result,
                    "Duplicate webhook skipped"
                );
                return WebhookAck::new(true, WebhookOutcome::Duplicate, Some(event.event_id));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(
                    gateway = %event.gateway,
                    event_id = %event.event_id,
                    error = %e,
                    "Webhook dedupe lookup failed"
                );
                return WebhookAck::new(false, WebhookOutcome::Failed, Some(event.event_id));
            }
        }

        // 4. Route and record
        match self.route(&event).await {
            Ok(Routed::Applied) => {
                let record = WebhookEventRecord::success(
                    event.gateway,
                    &event.event_id,
                    event.kind.as_str(),
                    event.payload.clone(),
                );
                self.record(record, WebhookOutcome::Processed).await
            }
            Ok(Routed::Ignored(reason)) => {
                tracing::info!(
                    gateway = %event.gateway,
                    event_id = %event.event_id,
                    event_type = %event.kind,
                    reason = %reason,
                    "Webhook ignored"
                );
                let record = WebhookEventRecord::ignored(
                    event.gateway,
                    &event.event_id,
                    event.kind.as_str(),
                    reason,
                    event.payload.clone(),
                );
                self.record(record, WebhookOutcome::Ignored).await
            }
            Ok(Routed::Deferred(reason)) => {
                tracing::warn!(
                    gateway = %event.gateway,
                    event_id = %event.event_id,
                    reason = %reason,
                    "Webhook left unrecorded until the purchase can take it"
                );
                WebhookAck::new(true, WebhookOutcome::Ignored, Some(event.event_id))
            }
            // Not recorded, so replaying the event applies it. The gateway
            // still gets a 200 and will not resend on its own; a completed
            // purchase is also repaired by the next verify call.
            Err(e) if e.is_retryable() => {
                tracing::error!(
                    gateway = %event.gateway,
                    event_id = %event.event_id,
                    error = %e,
                    "Webhook processing failed; left unrecorded for replay"
                );
                WebhookAck::new(false, WebhookOutcome::Failed, Some(event.event_id))
            }
            Err(e) => {
                tracing::warn!(
                    gateway = %event.gateway,
                    event_id = %event.event_id,
                    error = %e,
                    "Webhook processing failed"
                );
                let record = WebhookEventRecord::failed(
                    event.gateway,
                    &event.event_id,
                    event.kind.as_str(),
                    e.to_string(),
                    event.payload.clone(),
                );
                self.record(record, WebhookOutcome::Failed).await
            }
        }
    }

    async fn route(&self, event: &GatewayEvent) -> Result<Routed, WebhookError> {
        if !event.kind.is_known() {
            return Ok(Routed::Ignored(format!("unhandled event type {}", event.kind)));
        }
        if !event.has_reference() {
            return Ok(Routed::Ignored("event carries no order or payment id".into()));
        }

        let purchase = match self
            .reconciler
            .ledger()
            .find_by_reference(event.order_id.as_ref(), event.payment_id.as_ref())
            .await?
        {
            Some(purchase) => purchase,
            None => {
                tracing::warn!(
                    gateway = %event.gateway,
                    event_id = %event.event_id,
                    order_id = ?event.order_id.as_ref().map(|o| o.as_str()),
                    payment_id = ?event.payment_id.as_ref().map(|p| p.as_str()),
                    "Webhook references unknown purchase"
                );
                return Ok(Routed::Ignored("purchase not found".into()));
            }
        };

        let outcome = match &event.kind {
            GatewayEventKind::PaymentCaptured => {
                self.reconciler
                    .complete(&purchase.order_id, Some(event.payload.clone()))
                    .await?
            }
            GatewayEventKind::PaymentFailed => {
                let reason = event.failure_reason.as_deref().unwrap_or("payment failed");
                self.reconciler
                    .fail(&purchase.order_id, reason, Some(event.payload.clone()))
                    .await?
            }
            GatewayEventKind::PaymentRefunded => {
                if purchase.status == PurchaseStatus::Pending {
                    return Ok(Routed::Deferred("refund for a purchase that is not completed yet".into()));
                }
                let record = refund_record(event, &purchase)?;
                self.reconciler
                    .refund(&purchase.order_id, record, Some(event.payload.clone()))
                    .await?
            }
            GatewayEventKind::Unknown(_) => return Ok(Routed::Ignored("unhandled event type".into())),
        };

        if let ReconcileOutcome::Unchanged { current } = outcome {
            tracing::debug!(
                order_id = %purchase.order_id,
                event_type = %event.kind,
                current = %current,
                "Webhook was a no-op"
            );
        }
        Ok(Routed::Applied)
    }

    async fn record(&self, record: WebhookEventRecord, outcome: WebhookOutcome) -> WebhookAck {
        let event_id = record.event_id.clone();
        match self.events.save(record).await {
            Ok(SaveResult::Inserted) => WebhookAck::new(true, outcome, Some(event_id)),
            Ok(SaveResult::AlreadyExists) => WebhookAck::new(true, WebhookOutcome::Duplicate, Some(event_id)),
            Err(e) => {
                // The ledger writes are guarded, so reprocessing a replay is harmless.
                tracing::warn!(event_id = %event_id, error = %e, "Failed to record webhook event");
                WebhookAck::new(true, outcome, Some(event_id))
            }
        }
    }
}

fn refund_record(event: &GatewayEvent, purchase: &Purchase) -> Result<RefundRecord, WebhookError> {
    let refund_id = RefundId::new(event.refund_id.clone().unwrap_or_else(|| event.event_id.clone()))
        .map_err(|e| WebhookError::ParseError(e.to_string()))?;
    let amount = match event.refund_amount {
        Some(amount) if amount.currency() == purchase.amount.currency() => amount,
        Some(amount) => {
            return Err(WebhookError::ParseError(format!(
                "refund currency {} does not match purchase currency {}",
                amount.currency(),
                purchase.amount.currency()
            )))
        }
        None => purchase.amount,
    };
    Ok(RefundRecord {
        refund_id,
        amount,
        reason: "gateway refund notification".into(),
        refunded_at: Timestamp::now(),
    })
}
