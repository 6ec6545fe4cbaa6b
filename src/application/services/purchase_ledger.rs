//! PurchaseLedger - the only writer of purchase records.
//!
//! Every status change is one guarded write against storage:
//!
//! | Method | Moves | Guard |
//! |--------|-------|-------|
//! | `mark_completed` | pending → completed | `status = pending` |
//! | `mark_failed` | pending → failed | `status = pending` |
//! | `mark_refunded` | completed → refunded | `status = completed` |
//!
//! A guard miss is a normal outcome (`TransitionOutcome::Rejected`), not an
//! error. Webhooks and client polling race for the same transition and the
//! loser simply observes the winner's result.

use serde_json::Value;
use std::sync::Arc;

use crate::domain::billing::{NewPurchase, Purchase, PurchaseTransition, RefundRecord};
use crate::domain::foundation::{DomainError, OrderId, PaymentId, Timestamp, UserId};
use crate::ports::{PurchaseRepository, TransitionOutcome};

pub struct PurchaseLedger {
    repository: Arc<dyn PurchaseRepository>,
}

impl PurchaseLedger {
    pub fn new(repository: Arc<dyn PurchaseRepository>) -> Self {
        Self { repository }
    }

    /// Writes a new pending purchase before any gateway is contacted.
    pub async fn create_pending(&self, new: NewPurchase) -> Result<Purchase, DomainError> {
        let purchase = Purchase::new_pending(new, Timestamp::now());
        self.repository.insert(&purchase).await?;

        tracing::info!(
            order_id = %purchase.order_id,
            gateway = %purchase.gateway,
            plan = %purchase.plan,
            amount = %purchase.amount,
            "Purchase created"
        );
        Ok(purchase)
    }

    /// Replaces the placeholder payment id with the gateway's own.
    ///
    /// Returns `false` if a real payment id was already assigned.
    pub async fn attach_payment_id(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
        gateway_response: Option<&Value>,
    ) -> Result<bool, DomainError> {
        let assigned = self
            .repository
            .assign_payment_id(order_id, payment_id, gateway_response)
            .await?;
        if !assigned {
            tracing::debug!(order_id = %order_id, payment_id = %payment_id, "Payment id already assigned");
        }
        Ok(assigned)
    }

    pub async fn mark_completed(
        &self,
        order_id: &OrderId,
        gateway_payload: Option<Value>,
    ) -> Result<TransitionOutcome, DomainError> {
        let transition = PurchaseTransition::completed(gateway_payload, Timestamp::now());
        self.transition(order_id, transition).await
    }

    pub async fn mark_failed(
        &self,
        order_id: &OrderId,
        reason: impl Into<String>,
        gateway_payload: Option<Value>,
    ) -> Result<TransitionOutcome, DomainError> {
        let transition = PurchaseTransition::failed(reason, gateway_payload, Timestamp::now());
        self.transition(order_id, transition).await
    }

    pub async fn mark_refunded(
        &self,
        order_id: &OrderId,
        refund: RefundRecord,
        gateway_payload: Option<Value>,
    ) -> Result<TransitionOutcome, DomainError> {
        let transition = PurchaseTransition::refunded(refund, gateway_payload);
        self.transition(order_id, transition).await
    }

    async fn transition(
        &self,
        order_id: &OrderId,
        transition: PurchaseTransition,
    ) -> Result<TransitionOutcome, DomainError> {
        let target = transition.target;
        let outcome = self.repository.apply_transition(order_id, &transition).await?;

        match &outcome {
            TransitionOutcome::Applied(_) => {
                tracing::info!(order_id = %order_id, status = %target, "Purchase transition applied");
            }
            TransitionOutcome::Rejected { current } => {
                tracing::debug!(
                    order_id = %order_id,
                    target = %target,
                    current = %current,
                    "Purchase transition skipped"
                );
            }
            TransitionOutcome::NotFound => {
                tracing::warn!(order_id = %order_id, target = %target, "Transition for unknown purchase");
            }
        }
        Ok(outcome)
    }

    pub async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Option<Purchase>, DomainError> {
        self.repository.find_by_order_id(order_id).await
    }

    pub async fn find_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Purchase>, DomainError> {
        self.repository.find_by_payment_id(payment_id).await
    }

    /// Locates a purchase by order id first, then by payment id.
    pub async fn find_by_reference(
        &self,
        order_id: Option<&OrderId>,
        payment_id: Option<&PaymentId>,
    ) -> Result<Option<Purchase>, DomainError> {
        if let Some(order_id) = order_id {
            if let Some(purchase) = self.repository.find_by_order_id(order_id).await? {
                return Ok(Some(purchase));
            }
        }
        match payment_id {
            Some(payment_id) => self.repository.find_by_payment_id(payment_id).await,
            None => Ok(None),
        }
    }

    pub async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Purchase>, DomainError> {
        self.repository.list_by_user(user_id).await
    }
}
