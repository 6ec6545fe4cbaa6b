//! VerifyPaymentHandler - client-driven status check for one payment.

use std::sync::Arc;

use crate::application::services::{GatewayRegistry, PaymentReconciler, ReconcileOutcome};
use crate::domain::billing::{BillingError, PurchaseStatus};
use crate::domain::foundation::{OrderId, PaymentId};

/// Command to verify a payment. `payment_id` is untrusted client input.
#[derive(Debug, Clone)]
pub struct VerifyPaymentCommand {
    pub payment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyPaymentResult {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub status: PurchaseStatus,
    /// True if this call performed the transition.
    pub changed: bool,
}

/// Handler for payment verification.
///
/// Runs the same guarded transition as the webhook path, so whichever of
/// the two arrives first wins and the other sees the result.
pub struct VerifyPaymentHandler {
    gateways: Arc<GatewayRegistry>,
    reconciler: Arc<PaymentReconciler>,
}

impl VerifyPaymentHandler {
    pub fn new(gateways: Arc<GatewayRegistry>, reconciler: Arc<PaymentReconciler>) -> Self {
        Self { gateways, reconciler }
    }

    pub async fn handle(&self, cmd: VerifyPaymentCommand) -> Result<VerifyPaymentResult, BillingError> {
        // 1. Allow-list check before the id goes anywhere near a request
        let payment_id = PaymentId::parse(cmd.payment_id)?;

        // 2. Locate the purchase
        let ledger = self.reconciler.ledger();
        let purchase = ledger
            .find_by_payment_id(&payment_id)
            .await?
            .ok_or_else(|| BillingError::purchase_not_found(payment_id.as_str()))?;

        // 3. Only pending purchases need the gateway; a completed one still
        // gets its subscription if the first activation never finished
        if purchase.status != PurchaseStatus::Pending {
            if purchase.status == PurchaseStatus::Completed {
                self.reconciler.ensure_activated(&purchase).await?;
            }
            return Ok(VerifyPaymentResult {
                order_id: purchase.order_id,
                payment_id: purchase.payment_id,
                status: purchase.status,
                changed: false,
            });
        }

        // 4. Ask the gateway and apply its answer
        let gateway = self.gateways.get(purchase.gateway)?;
        let lookup = gateway.fetch_payment(&purchase.payment_id).await.map_err(|e| {
            tracing::warn!(
                order_id = %purchase.order_id,
                gateway = %purchase.gateway,
                error = %e,
                "Payment lookup failed"
            );
            e.into_billing(purchase.gateway)
        })?;

        if let Some(remote_order) = &lookup.order_id {
            if remote_order != &purchase.order_id {
                tracing::warn!(
                    order_id = %purchase.order_id,
                    remote_order_id = %remote_order,
                    "Gateway reports a different order for this payment"
                );
                return Err(BillingError::gateway_failed(
                    purchase.gateway,
                    "payment belongs to a different order",
                    false,
                ));
            }
        }

        let outcome = self.reconciler.apply_lookup(&purchase, lookup).await?;
        let status = match &outcome {
            ReconcileOutcome::NotFound => {
                return Err(BillingError::purchase_not_found(purchase.order_id.as_str()))
            }
            other => other.status().unwrap_or(purchase.status),
        };

        Ok(VerifyPaymentResult {
            order_id: purchase.order_id,
            payment_id: purchase.payment_id,
            status,
            changed: outcome.changed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::BillingFixture;
    use super::*;
    use crate::domain::entitlement::EntitlementSet;
    use crate::ports::{GatewayError, RemotePaymentState};

    fn verify(payment_id: &PaymentId) -> VerifyPaymentCommand {
        VerifyPaymentCommand {
            payment_id: payment_id.to_string(),
        }
    }

    #[tokio::test]
    async fn captured_payment_completes_and_activates() {
        let f = BillingFixture::new();
        let checkout = f.checkout().await;
        f.gateway
            .set_payment_state(&checkout.payment_id, Some(checkout.order_id.clone()), RemotePaymentState::Captured);

        let result = f.verify_payment.handle(verify(&checkout.payment_id)).await.unwrap();

        assert_eq!(result.status, PurchaseStatus::Completed);
        assert!(result.changed);
        assert!(f.active_subscription().await.is_some());
    }

    #[tokio::test]
    async fn second_verify_is_a_noop_without_gateway_call() {
        let f = BillingFixture::new();
        let checkout = f.checkout().await;
        f.gateway
            .set_payment_state(&checkout.payment_id, Some(checkout.order_id.clone()), RemotePaymentState::Captured);
        f.verify_payment.handle(verify(&checkout.payment_id)).await.unwrap();

        let again = f.verify_payment.handle(verify(&checkout.payment_id)).await.unwrap();

        assert_eq!(again.status, PurchaseStatus::Completed);
        assert!(!again.changed);
        assert_eq!(f.gateway.call_count("fetch_payment"), 1);
    }

    #[tokio::test]
    async fn verify_after_failed_activation_starts_the_subscription() {
        let f = BillingFixture::new();
        let checkout = f.checkout().await;
        f.gateway
            .set_payment_state(&checkout.payment_id, Some(checkout.order_id.clone()), RemotePaymentState::Captured);
        f.subscription_repo.fail_next_insert();

        assert!(f.verify_payment.handle(verify(&checkout.payment_id)).await.is_err());
        assert_eq!(f.purchase(&checkout.order_id).await.status, PurchaseStatus::Completed);
        assert!(f.active_subscription().await.is_none());

        let again = f.verify_payment.handle(verify(&checkout.payment_id)).await.unwrap();

        assert_eq!(again.status, PurchaseStatus::Completed);
        assert!(!again.changed);
        let subscription = f.active_subscription().await.unwrap();
        assert_eq!(subscription.purchase_id, checkout.order_id);
        assert_eq!(f.entitlements().await, EntitlementSet::for_plan(subscription.plan));
        assert_eq!(f.gateway.call_count("fetch_payment"), 1);
    }

    #[tokio::test]
    async fn still_pending_stays_pending() {
        let f = BillingFixture::new();
        let checkout = f.checkout().await;

        let result = f.verify_payment.handle(verify(&checkout.payment_id)).await.unwrap();

        assert_eq!(result.status, PurchaseStatus::Pending);
        assert!(!result.changed);
    }

    #[tokio::test]
    async fn declined_payment_fails_with_reason() {
        let f = BillingFixture::new();
        let checkout = f.checkout().await;
        f.gateway.set_payment_state(
            &checkout.payment_id,
            None,
            RemotePaymentState::Failed { reason: "do not honor".into() },
        );

        let result = f.verify_payment.handle(verify(&checkout.payment_id)).await.unwrap();

        assert_eq!(result.status, PurchaseStatus::Failed);
        let purchase = f.purchase(&checkout.order_id).await;
        assert_eq!(purchase.failure_reason.as_deref(), Some("do not honor"));
        assert!(f.active_subscription().await.is_none());
    }

    #[tokio::test]
    async fn crafted_identifier_is_rejected_before_lookup() {
        let f = BillingFixture::new();

        for raw in ["../admin", "abc?x=1", "id with space", "", "a/b"] {
            let err = f
                .verify_payment
                .handle(VerifyPaymentCommand { payment_id: raw.into() })
                .await
                .unwrap_err();
            assert!(
                matches!(err, BillingError::InvalidIdentifierFormat { .. }),
                "{:?} gave {:?}",
                raw,
                err
            );
        }
        assert_eq!(f.gateway.call_count("fetch_payment"), 0);
    }

    #[tokio::test]
    async fn unknown_payment_is_not_found() {
        let f = BillingFixture::new();
        let err = f
            .verify_payment
            .handle(VerifyPaymentCommand { payment_id: "PAY-unknown".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::PurchaseNotFound(_)));
    }

    #[tokio::test]
    async fn lookup_failure_surfaces_and_keeps_purchase_pending() {
        let f = BillingFixture::new();
        let checkout = f.checkout().await;
        f.gateway.set_method_error("fetch_payment", GatewayError::network("connection reset"));

        let err = f.verify_payment.handle(verify(&checkout.payment_id)).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(f.purchase(&checkout.order_id).await.status, PurchaseStatus::Pending);
    }

    #[tokio::test]
    async fn mismatched_order_is_refused() {
        let f = BillingFixture::new();
        let checkout = f.checkout().await;
        f.gateway.set_payment_state(
            &checkout.payment_id,
            Some(OrderId::generate()),
            RemotePaymentState::Captured,
        );

        let err = f.verify_payment.handle(verify(&checkout.payment_id)).await.unwrap_err();

        assert!(matches!(err, BillingError::GatewayRequestFailed { retryable: false, .. }));
        assert_eq!(f.purchase(&checkout.order_id).await.status, PurchaseStatus::Pending);
    }
}
