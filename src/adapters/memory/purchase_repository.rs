//! In-memory purchase repository.
//!
//! Each guarded transition runs under the map's write lock, which gives the
//! same single-winner behaviour as the conditional UPDATE in Postgres.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::billing::{Purchase, PurchaseTransition};
use crate::domain::foundation::{DomainError, ErrorCode, OrderId, PaymentId, UserId};
use crate::ports::{PurchaseRepository, TransitionOutcome};

#[derive(Default)]
pub struct InMemoryPurchaseRepository {
    purchases: RwLock<HashMap<OrderId, Purchase>>,
}

impl InMemoryPurchaseRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PurchaseRepository for InMemoryPurchaseRepository {
    async fn insert(&self, purchase: &Purchase) -> Result<(), DomainError> {
        let mut purchases = self.purchases.write().await;
        if purchases.contains_key(&purchase.order_id) {
            return Err(DomainError::new(
                ErrorCode::DuplicatePurchase,
                format!("Purchase {} already exists", purchase.order_id),
            ));
        }
        purchases.insert(purchase.order_id.clone(), purchase.clone());
        Ok(())
    }

    async fn apply_transition(
        &self,
        order_id: &OrderId,
        transition: &PurchaseTransition,
    ) -> Result<TransitionOutcome, DomainError> {
        let mut purchases = self.purchases.write().await;
        let Some(purchase) = purchases.get_mut(order_id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if purchase.apply(transition) {
            Ok(TransitionOutcome::Applied(purchase.clone()))
        } else {
            Ok(TransitionOutcome::Rejected {
                current: purchase.status,
            })
        }
    }

    async fn assign_payment_id(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
        gateway_response: Option<&Value>,
    ) -> Result<bool, DomainError> {
        let mut purchases = self.purchases.write().await;
        let taken = purchases
            .values()
            .any(|p| &p.payment_id == payment_id && &p.order_id != order_id);
        if taken {
            return Err(DomainError::new(
                ErrorCode::DuplicatePurchase,
                format!("Payment id {} is already assigned", payment_id),
            ));
        }
        let Some(purchase) = purchases.get_mut(order_id) else {
            return Ok(false);
        };
        if !purchase.has_placeholder_payment_id() {
            return Ok(false);
        }
        purchase.payment_id = payment_id.clone();
        if let Some(response) = gateway_response {
            purchase.gateway_response = Some(response.clone());
        }
        Ok(true)
    }

    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Option<Purchase>, DomainError> {
        Ok(self.purchases.read().await.get(order_id).cloned())
    }

    async fn find_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Purchase>, DomainError> {
        Ok(self
            .purchases
            .read()
            .await
            .values()
            .find(|p| &p.payment_id == payment_id)
            .cloned())
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Purchase>, DomainError> {
        let mut list: Vec<Purchase> = self
            .purchases
            .read()
            .await
            .values()
            .filter(|p| &p.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }
}
