//! PaymentReconciler - the guarded path shared by webhooks and polling.
//!
//! Both entry points end up here, so a capture seen twice (once by the
//! webhook, once by the client's verify call) funds exactly one
//! subscription: only the caller whose ledger write wins goes on to
//! activate. A completed purchase seen again re-runs the idempotent
//! activation, which repairs a purchase whose first activation failed after
//! the ledger write had committed.

use serde_json::Value;
use std::sync::Arc;

use super::purchase_ledger::PurchaseLedger;
use super::subscription_manager::SubscriptionManager;
use crate::domain::billing::{Purchase, PurchaseStatus, RefundRecord};
use crate::domain::foundation::{DomainError, ErrorCode, OrderId};
use crate::domain::subscription::{CancellationReason, Subscription};
use crate::ports::{PaymentLookup, RemotePaymentState, TransitionOutcome};

/// What a reconciliation step did.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// This call moved the purchase to completed and started a subscription.
    Completed {
        purchase: Purchase,
        subscription: Subscription,
    },
    Failed(Purchase),
    /// This call moved the purchase to refunded. `cancelled` is the
    /// subscription it ended, if that was still active.
    Refunded {
        purchase: Purchase,
        cancelled: Option<Subscription>,
    },
    /// Nothing changed; the purchase is in `current`.
    Unchanged { current: PurchaseStatus },
    NotFound,
}

impl ReconcileOutcome {
    /// True if this call performed a transition.
    pub fn changed(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Completed { .. } | ReconcileOutcome::Failed(_) | ReconcileOutcome::Refunded { .. }
        )
    }

    /// Purchase status after this step, when known.
    pub fn status(&self) -> Option<PurchaseStatus> {
        match self {
            ReconcileOutcome::Completed { .. } => Some(PurchaseStatus::Completed),
            ReconcileOutcome::Failed(_) => Some(PurchaseStatus::Failed),
            ReconcileOutcome::Refunded { .. } => Some(PurchaseStatus::Refunded),
            ReconcileOutcome::Unchanged { current } => Some(*current),
            ReconcileOutcome::NotFound => None,
        }
    }
}

pub struct PaymentReconciler {
    ledger: Arc<PurchaseLedger>,
    subscriptions: Arc<SubscriptionManager>,
}

impl PaymentReconciler {
    pub fn new(ledger: Arc<PurchaseLedger>, subscriptions: Arc<SubscriptionManager>) -> Self {
        Self { ledger, subscriptions }
    }

    pub fn ledger(&self) -> &Arc<PurchaseLedger> {
        &self.ledger
    }

    /// pending → completed, then activation.
    pub async fn complete(
        &self,
        order_id: &OrderId,
        gateway_payload: Option<Value>,
    ) -> Result<ReconcileOutcome, DomainError> {
        match self.ledger.mark_completed(order_id, gateway_payload).await? {
            TransitionOutcome::Applied(purchase) => {
                let subscription = self.subscriptions.activate(&purchase).await?;
                Ok(ReconcileOutcome::Completed { purchase, subscription })
            }
            TransitionOutcome::Rejected {
                current: PurchaseStatus::Completed,
            } => {
                let reloaded = self.ledger.find_by_order_id(order_id).await?;
                if let Some(purchase) = reloaded.filter(|p| p.status == PurchaseStatus::Completed) {
                    self.ensure_activated(&purchase).await?;
                }
                Ok(ReconcileOutcome::Unchanged {
                    current: PurchaseStatus::Completed,
                })
            }
            TransitionOutcome::Rejected { current } => Ok(ReconcileOutcome::Unchanged { current }),
            TransitionOutcome::NotFound => Ok(ReconcileOutcome::NotFound),
        }
    }

    /// Returns the subscription a completed purchase paid for, creating it
    /// if an earlier activation never finished.
    pub async fn ensure_activated(&self, purchase: &Purchase) -> Result<Subscription, DomainError> {
        if purchase.status != PurchaseStatus::Completed {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Purchase {} is {}, not completed", purchase.order_id, purchase.status),
            ));
        }
        self.subscriptions.activate(purchase).await
    }

    pub async fn fail(
        &self,
        order_id: &OrderId,
        reason: &str,
        gateway_payload: Option<Value>,
    ) -> Result<ReconcileOutcome, DomainError> {
        match self.ledger.mark_failed(order_id, reason, gateway_payload).await? {
            TransitionOutcome::Applied(purchase) => Ok(ReconcileOutcome::Failed(purchase)),
            TransitionOutcome::Rejected { current } => Ok(ReconcileOutcome::Unchanged { current }),
            TransitionOutcome::NotFound => Ok(ReconcileOutcome::NotFound),
        }
    }

    /// completed → refunded, then cancellation of the funded subscription.
    pub async fn refund(
        &self,
        order_id: &OrderId,
        refund: RefundRecord,
        gateway_payload: Option<Value>,
    ) -> Result<ReconcileOutcome, DomainError> {
        match self.ledger.mark_refunded(order_id, refund, gateway_payload).await? {
            TransitionOutcome::Applied(purchase) => {
                let cancelled = self
                    .subscriptions
                    .cancel_for_purchase(order_id, CancellationReason::Refunded)
                    .await?;
                Ok(ReconcileOutcome::Refunded { purchase, cancelled })
            }
            TransitionOutcome::Rejected { current } => Ok(ReconcileOutcome::Unchanged { current }),
            TransitionOutcome::NotFound => Ok(ReconcileOutcome::NotFound),
        }
    }

    /// Applies what the gateway reports for a purchase we hold locally.
    ///
    /// A remote refund without a refund id is left for the refund webhook.
    pub async fn apply_lookup(
        &self,
        purchase: &Purchase,
        lookup: PaymentLookup,
    ) -> Result<ReconcileOutcome, DomainError> {
        match lookup.state {
            RemotePaymentState::Captured => self.complete(&purchase.order_id, Some(lookup.raw)).await,
            RemotePaymentState::Failed { reason } => {
                self.fail(&purchase.order_id, &reason, Some(lookup.raw)).await
            }
            RemotePaymentState::Pending => Ok(ReconcileOutcome::Unchanged {
                current: purchase.status,
            }),
            RemotePaymentState::Refunded => {
                tracing::warn!(
                    order_id = %purchase.order_id,
                    status = %purchase.status,
                    "Gateway reports refund; waiting for refund notification"
                );
                Ok(ReconcileOutcome::Unchanged {
                    current: purchase.status,
                })
            }
        }
    }
}
