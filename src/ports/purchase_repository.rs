//! Purchase repository port.
//!
//! Purchases are never deleted. After the initial insert they change only
//! through [`PurchaseRepository::apply_transition`], which implementations
//! must perform as one conditional write keyed on the current status
//! (`UPDATE … WHERE order_id = $1 AND status = $expected`), never as a
//! load-mutate-save round trip.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::billing::{Purchase, PurchaseStatus, PurchaseTransition};
use crate::domain::foundation::{DomainError, OrderId, PaymentId, UserId};

/// What a guarded transition did.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// This call performed the transition. Carries the updated record.
    Applied(Purchase),
    /// The record was not in the expected state; nothing changed.
    Rejected { current: PurchaseStatus },
    /// No such order.
    NotFound,
}

impl TransitionOutcome {
    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    /// Persist a new pending purchase.
    ///
    /// # Errors
    ///
    /// - `DuplicatePurchase` if the order id already exists
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, purchase: &Purchase) -> Result<(), DomainError>;

    /// Apply `transition` only if the stored status equals
    /// `transition.expected_from()`.
    async fn apply_transition(
        &self,
        order_id: &OrderId,
        transition: &PurchaseTransition,
    ) -> Result<TransitionOutcome, DomainError>;

    /// Replace the placeholder payment id with the gateway's id.
    ///
    /// Only succeeds while the placeholder is still in place; returns
    /// whether this call changed it.
    async fn assign_payment_id(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
        gateway_response: Option<&Value>,
    ) -> Result<bool, DomainError>;

    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Option<Purchase>, DomainError>;

    async fn find_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Purchase>, DomainError>;

    /// All purchases of a user, newest first.
    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Purchase>, DomainError>;
}
