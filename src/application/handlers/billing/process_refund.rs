//! ProcessRefundHandler - refunds a completed purchase through its gateway.

use std::sync::Arc;

use crate::application::services::{GatewayRegistry, PaymentReconciler, ReconcileOutcome};
use crate::domain::billing::{BillingError, Money, PurchaseStatus, RefundRecord};
use crate::domain::foundation::{OrderId, PaymentId, RefundId, Timestamp};
use crate::ports::RefundRequest;

/// Command to refund a payment.
#[derive(Debug, Clone)]
pub struct ProcessRefundCommand {
    pub payment_id: String,
    /// `None` refunds the full charge. A USD amount against a non-USD
    /// purchase is converted at the purchase's snapshot rate.
    pub amount: Option<Money>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRefundResult {
    pub order_id: OrderId,
    pub refund_id: RefundId,
    pub amount: Money,
    /// True when the purchase had already been refunded before this call.
    pub already_refunded: bool,
}

/// Handler for refunds.
///
/// Only completed purchases are refundable. A purchase that is already
/// refunded returns its recorded refund instead of refunding twice.
pub struct ProcessRefundHandler {
    gateways: Arc<GatewayRegistry>,
    reconciler: Arc<PaymentReconciler>,
}

impl ProcessRefundHandler {
    pub fn new(gateways: Arc<GatewayRegistry>, reconciler: Arc<PaymentReconciler>) -> Self {
        Self { gateways, reconciler }
    }

    pub async fn handle(&self, cmd: ProcessRefundCommand) -> Result<ProcessRefundResult, BillingError> {
        let payment_id = PaymentId::parse(cmd.payment_id)?;
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(BillingError::validation("reason", "refund reason is required"));
        }

        let ledger = self.reconciler.ledger();
        let purchase = ledger
            .find_by_payment_id(&payment_id)
            .await?
            .ok_or_else(|| BillingError::purchase_not_found(payment_id.as_str()))?;

        match purchase.status {
            PurchaseStatus::Completed => {}
            PurchaseStatus::Refunded => {
                if let Some(refund) = purchase.refund {
                    return Ok(ProcessRefundResult {
                        order_id: purchase.order_id,
                        refund_id: refund.refund_id,
                        amount: refund.amount,
                        already_refunded: true,
                    });
                }
                return Err(BillingError::not_refundable(purchase.order_id.as_str(), purchase.status));
            }
            status => return Err(BillingError::not_refundable(purchase.order_id.as_str(), status)),
        }

        let amount = purchase.refundable_amount(cmd.amount)?;
        let gateway = self.gateways.get(purchase.gateway)?;

        let confirmation = gateway
            .refund(&RefundRequest {
                order_id: purchase.order_id.clone(),
                payment_id: purchase.payment_id.clone(),
                amount,
                reason: reason.to_string(),
                gateway_response: purchase.gateway_response.clone(),
            })
            .await
            .map_err(|e| {
                tracing::warn!(
                    order_id = %purchase.order_id,
                    gateway = %purchase.gateway,
                    error = %e,
                    "Refund request failed"
                );
                e.into_billing(purchase.gateway)
            })?;

        let record = RefundRecord {
            refund_id: confirmation.refund_id.clone(),
            amount,
            reason: reason.to_string(),
            refunded_at: Timestamp::now(),
        };

        match self
            .reconciler
            .refund(&purchase.order_id, record, Some(confirmation.raw))
            .await?
        {
            ReconcileOutcome::Refunded { .. } => Ok(ProcessRefundResult {
                order_id: purchase.order_id,
                refund_id: confirmation.refund_id,
                amount,
                already_refunded: false,
            }),
            ReconcileOutcome::Unchanged {
                current: PurchaseStatus::Refunded,
            } => {
                // A refund webhook got there first; report what it stored.
                let stored = ledger
                    .find_by_order_id(&purchase.order_id)
                    .await?
                    .and_then(|p| p.refund);
                let (refund_id, amount) = stored
                    .map(|r| (r.refund_id, r.amount))
                    .unwrap_or((confirmation.refund_id, amount));
                Ok(ProcessRefundResult {
                    order_id: purchase.order_id,
                    refund_id,
                    amount,
                    already_refunded: true,
                })
            }
            ReconcileOutcome::Unchanged { current } => {
                Err(BillingError::not_refundable(purchase.order_id.as_str(), current))
            }
            ReconcileOutcome::NotFound => Err(BillingError::purchase_not_found(purchase.order_id.as_str())),
            other => Err(BillingError::infrastructure(format!(
                "unexpected refund outcome: {:?}",
                other.status()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::BillingFixture;
    use super::*;
    use crate::domain::billing::Currency;
    use crate::domain::entitlement::EntitlementSet;
    use crate::domain::subscription::{CancellationReason, SubscriptionStatus};
    use crate::ports::GatewayError;

    fn refund(payment_id: &PaymentId, amount: Option<Money>) -> ProcessRefundCommand {
        ProcessRefundCommand {
            payment_id: payment_id.to_string(),
            amount,
            reason: "requested_by_customer".into(),
        }
    }

    #[tokio::test]
    async fn full_refund_cancels_subscription_and_revokes() {
        let f = BillingFixture::new();
        let checkout = f.completed_checkout().await;

        let result = f.process_refund.handle(refund(&checkout.payment_id, None)).await.unwrap();

        assert!(!result.already_refunded);
        assert_eq!(result.amount, checkout.amount);
        let purchase = f.purchase(&checkout.order_id).await;
        assert_eq!(purchase.status, PurchaseStatus::Refunded);
        assert_eq!(purchase.refund.unwrap().refund_id, result.refund_id);

        let history = f.subscriptions.history_for(&f.user).await.unwrap();
        assert_eq!(history[0].status, SubscriptionStatus::Cancelled);
        assert_eq!(history[0].cancellation_reason, Some(CancellationReason::Refunded));
        assert_eq!(f.entitlements().await, EntitlementSet::free());
    }

    #[tokio::test]
    async fn repeated_refund_returns_recorded_refund() {
        let f = BillingFixture::new();
        let checkout = f.completed_checkout().await;

        let first = f.process_refund.handle(refund(&checkout.payment_id, None)).await.unwrap();
        let second = f.process_refund.handle(refund(&checkout.payment_id, None)).await.unwrap();

        assert!(second.already_refunded);
        assert_eq!(second.refund_id, first.refund_id);
        assert_eq!(f.gateway.call_count("refund"), 1);
    }

    #[tokio::test]
    async fn pending_purchase_is_not_refundable() {
        let f = BillingFixture::new();
        let checkout = f.checkout().await;

        let err = f.process_refund.handle(refund(&checkout.payment_id, None)).await.unwrap_err();

        assert!(matches!(
            err,
            BillingError::PurchaseNotRefundable { status: PurchaseStatus::Pending, .. }
        ));
        assert_eq!(f.gateway.call_count("refund"), 0);
    }

    #[tokio::test]
    async fn usd_partial_refund_uses_snapshot_rate() {
        let f = BillingFixture::new();
        let checkout = f.completed_checkout_in(Currency::Sar).await;
        f.rates.set_rate(Currency::Sar, 9.99).await;

        let ten_usd = Money::parse_decimal(Currency::Usd, "10.00").unwrap();
        let result = f
            .process_refund
            .handle(refund(&checkout.payment_id, Some(ten_usd)))
            .await
            .unwrap();

        assert_eq!(result.amount, Money::parse_decimal(Currency::Sar, "37.50").unwrap());
    }

    #[tokio::test]
    async fn refund_above_charge_is_rejected() {
        let f = BillingFixture::new();
        let checkout = f.completed_checkout().await;
        let too_much = Money::parse_decimal(Currency::Usd, "500.00").unwrap();

        let err = f
            .process_refund
            .handle(refund(&checkout.payment_id, Some(too_much)))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::ValidationFailed { .. }));
        assert_eq!(f.gateway.call_count("refund"), 0);
    }

    #[tokio::test]
    async fn blank_reason_is_rejected() {
        let f = BillingFixture::new();
        let checkout = f.completed_checkout().await;
        let mut cmd = refund(&checkout.payment_id, None);
        cmd.reason = "   ".into();

        let err = f.process_refund.handle(cmd).await.unwrap_err();
        assert!(matches!(err, BillingError::ValidationFailed { ref field, .. } if field == "reason"));
    }

    #[tokio::test]
    async fn gateway_failure_leaves_purchase_completed() {
        let f = BillingFixture::new();
        let checkout = f.completed_checkout().await;
        f.gateway.set_error(GatewayError::new(
            crate::ports::GatewayErrorCode::ProviderError,
            "HTTP 503",
        ));

        let err = f.process_refund.handle(refund(&checkout.payment_id, None)).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(f.purchase(&checkout.order_id).await.status, PurchaseStatus::Completed);
        assert!(f.active_subscription().await.is_some());
    }
}
