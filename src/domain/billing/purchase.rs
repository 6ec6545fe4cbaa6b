//! Purchase aggregate - one record per payment attempt.
//!
//! A purchase is written once as `pending` and afterwards only changes
//! through [`PurchaseTransition`]s. Storage adapters apply a transition as a
//! single conditional write guarded by the transition's expected status.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::currency::{Currency, Money, PriceSnapshot};
use super::errors::BillingError;
use super::gateway::GatewayKind;
use super::plan::{BillingCycle, PlanType};
use super::status::PurchaseStatus;
use crate::domain::foundation::{
    OrderId, PaymentId, RefundId, StateMachine, Timestamp, UserId, ValidationError,
};

/// Identity of the paying customer as given at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub email: String,
    pub name: Option<String>,
}

impl CustomerInfo {
    pub fn new(email: impl Into<String>, name: Option<String>) -> Result<Self, ValidationError> {
        let email = email.into().trim().to_string();
        if email.is_empty() {
            return Err(ValidationError::empty_field("email"));
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => {
                return Err(ValidationError::invalid_format(
                    "email",
                    "expected an address like name@example.com",
                ))
            }
        }
        Ok(Self { email, name })
    }
}

/// Postal billing address, passed through to gateways that require one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAddress {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
}

impl BillingAddress {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.line1.trim().is_empty() {
            return Err(ValidationError::empty_field("billing_address.line1"));
        }
        if self.city.trim().is_empty() {
            return Err(ValidationError::empty_field("billing_address.city"));
        }
        if self.country.len() != 2 || !self.country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "billing_address.country",
                "expected a two-letter country code",
            ));
        }
        Ok(())
    }
}

/// What the gateway reported when a refund went through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub refund_id: RefundId,
    pub amount: Money,
    pub reason: String,
    pub refunded_at: Timestamp,
}

/// The persisted record of one payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub gateway: GatewayKind,
    pub plan: PlanType,
    pub billing_cycle: BillingCycle,
    pub status: PurchaseStatus,
    /// Amount actually charged, in the settlement currency.
    pub amount: Money,
    pub price_snapshot: PriceSnapshot,
    /// Last raw payload seen from the gateway. Audit only.
    pub gateway_response: Option<Value>,
    pub customer: CustomerInfo,
    pub billing_address: Option<BillingAddress>,
    pub metadata: Value,
    pub failure_reason: Option<String>,
    pub refund: Option<RefundRecord>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Everything needed to open a pending purchase.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub user_id: UserId,
    pub gateway: GatewayKind,
    pub plan: PlanType,
    pub billing_cycle: BillingCycle,
    pub amount: Money,
    pub price_snapshot: PriceSnapshot,
    pub customer: CustomerInfo,
    pub billing_address: Option<BillingAddress>,
    pub metadata: Value,
}

impl Purchase {
    /// Creates a pending purchase with a fresh order id.
    ///
    /// The payment id starts as a placeholder equal to the order id until
    /// the gateway assigns its own.
    pub fn new_pending(new: NewPurchase, now: Timestamp) -> Self {
        let order_id = OrderId::generate();
        let payment_id = PaymentId::placeholder_for(&order_id);

        let mut metadata = match new.metadata {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        metadata.insert(
            "original_amount".to_string(),
            json!({
                "currency": new.price_snapshot.base_currency_amount.currency().code(),
                "value": new.price_snapshot.base_currency_amount.to_decimal_string(),
            }),
        );

        Self {
            order_id,
            payment_id,
            user_id: new.user_id,
            gateway: new.gateway,
            plan: new.plan,
            billing_cycle: new.billing_cycle,
            status: PurchaseStatus::Pending,
            amount: new.amount,
            price_snapshot: new.price_snapshot,
            gateway_response: None,
            customer: new.customer,
            billing_address: new.billing_address,
            metadata: Value::Object(metadata),
            failure_reason: None,
            refund: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// True while the payment id is still the order-id placeholder.
    pub fn has_placeholder_payment_id(&self) -> bool {
        self.payment_id.as_str() == self.order_id.as_str()
    }

    /// Applies `transition` if the current status matches its guard.
    ///
    /// Returns `false` and leaves the purchase untouched otherwise. Used by
    /// storage adapters that hold an exclusive lock on the record.
    pub fn apply(&mut self, transition: &PurchaseTransition) -> bool {
        if self.status != transition.expected_from() || !self.status.can_transition_to(&transition.target) {
            return false;
        }

        self.status = transition.target;
        self.updated_at = transition.at;
        if transition.gateway_response.is_some() {
            self.gateway_response = transition.gateway_response.clone();
        }
        match transition.target {
            PurchaseStatus::Completed => self.completed_at = Some(transition.at),
            PurchaseStatus::Failed => self.failure_reason = transition.failure_reason.clone(),
            PurchaseStatus::Refunded => self.refund = transition.refund.clone(),
            PurchaseStatus::Pending => {}
        }
        true
    }

    /// Works out the settlement amount to refund.
    ///
    /// `None` refunds the full charge. A request in the settlement currency
    /// is used as-is. A USD request against a non-USD purchase is converted
    /// at the snapshot rate, never at a live rate.
    pub fn refundable_amount(&self, requested: Option<Money>) -> Result<Money, BillingError> {
        let amount = match requested {
            None => return Ok(self.amount),
            Some(m) if m.currency() == self.amount.currency() => m,
            Some(m) if m.currency() == Currency::Usd => self
                .price_snapshot
                .settlement_amount_for(&m)
                .map_err(BillingError::from)?,
            Some(m) => {
                return Err(BillingError::validation(
                    "currency",
                    format!(
                        "refund currency {} does not match purchase currency {}",
                        m.currency(),
                        self.amount.currency()
                    ),
                ))
            }
        };

        if amount.is_zero() {
            return Err(BillingError::validation("amount", "refund amount must be positive"));
        }
        if amount.minor_units() > self.amount.minor_units() {
            return Err(BillingError::validation(
                "amount",
                format!("refund {} exceeds charged {}", amount, self.amount),
            ));
        }
        Ok(amount)
    }
}

/// A guarded status change plus the data it writes.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseTransition {
    pub target: PurchaseStatus,
    pub gateway_response: Option<Value>,
    pub failure_reason: Option<String>,
    pub refund: Option<RefundRecord>,
    pub at: Timestamp,
}

impl PurchaseTransition {
    pub fn completed(gateway_response: Option<Value>, at: Timestamp) -> Self {
        Self {
            target: PurchaseStatus::Completed,
            gateway_response,
            failure_reason: None,
            refund: None,
            at,
        }
    }

    pub fn failed(reason: impl Into<String>, gateway_response: Option<Value>, at: Timestamp) -> Self {
        Self {
            target: PurchaseStatus::Failed,
            gateway_response,
            failure_reason: Some(reason.into()),
            refund: None,
            at,
        }
    }

    pub fn refunded(refund: RefundRecord, gateway_response: Option<Value>) -> Self {
        let at = refund.refunded_at;
        Self {
            target: PurchaseStatus::Refunded,
            gateway_response,
            failure_reason: None,
            refund: Some(refund),
            at,
        }
    }

    /// Status the record must hold for this transition to apply.
    pub fn expected_from(&self) -> PurchaseStatus {
        // Only Pending lacks a predecessor, and no constructor targets it.
        PurchaseStatus::guard_for(self.target).unwrap_or(PurchaseStatus::Pending)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::pending_purchase;
    use super::*;

    fn refund_record(amount: Money) -> RefundRecord {
        RefundRecord {
            refund_id: RefundId::new("rf_1").unwrap(),
            amount,
            reason: "requested".to_string(),
            refunded_at: Timestamp::now(),
        }
    }

    #[test]
    fn customer_info_requires_plausible_email() {
        assert!(CustomerInfo::new("a@b.co", None).is_ok());
        assert!(CustomerInfo::new("", None).is_err());
        assert!(CustomerInfo::new("no-at-sign", None).is_err());
        assert!(CustomerInfo::new("@example.com", None).is_err());
    }

    #[test]
    fn billing_address_requires_country_code() {
        let mut address = BillingAddress {
            line1: "1 King Fahd Rd".to_string(),
            line2: None,
            city: "Riyadh".to_string(),
            state: None,
            postal_code: None,
            country: "SA".to_string(),
        };
        assert!(address.validate().is_ok());
        address.country = "Saudi".to_string();
        assert!(address.validate().is_err());
    }

    #[test]
    fn new_pending_uses_placeholder_payment_id_and_records_original_amount() {
        let purchase = pending_purchase(Currency::Sar, 3.75);
        assert_eq!(purchase.status, PurchaseStatus::Pending);
        assert!(purchase.has_placeholder_payment_id());
        assert_eq!(purchase.metadata["original_amount"]["value"], "19.99");
        assert_eq!(purchase.metadata["source"], "test");
    }

    #[test]
    fn apply_completes_pending_purchase_once() {
        let mut purchase = pending_purchase(Currency::Usd, 1.0);
        let transition = PurchaseTransition::completed(Some(json!({"id": "x"})), Timestamp::now());

        assert!(purchase.apply(&transition));
        assert_eq!(purchase.status, PurchaseStatus::Completed);
        assert!(purchase.completed_at.is_some());
        assert!(!purchase.apply(&transition));
    }

    #[test]
    fn apply_refuses_to_fail_a_completed_purchase() {
        let mut purchase = pending_purchase(Currency::Usd, 1.0);
        purchase.apply(&PurchaseTransition::completed(None, Timestamp::now()));

        let failed = PurchaseTransition::failed("late decline", None, Timestamp::now());
        assert!(!purchase.apply(&failed));
        assert_eq!(purchase.status, PurchaseStatus::Completed);
        assert!(purchase.failure_reason.is_none());
    }

    #[test]
    fn refund_requires_completed_purchase() {
        let mut purchase = pending_purchase(Currency::Usd, 1.0);
        let refund = PurchaseTransition::refunded(refund_record(purchase.amount), None);

        assert!(!purchase.apply(&refund));
        purchase.apply(&PurchaseTransition::completed(None, Timestamp::now()));
        assert!(purchase.apply(&refund));
        assert_eq!(purchase.status, PurchaseStatus::Refunded);
        assert!(purchase.refund.is_some());
    }

    #[test]
    fn refunded_purchase_cannot_complete_again() {
        let mut purchase = pending_purchase(Currency::Usd, 1.0);
        purchase.apply(&PurchaseTransition::completed(None, Timestamp::now()));
        purchase.apply(&PurchaseTransition::refunded(refund_record(purchase.amount), None));

        assert!(!purchase.apply(&PurchaseTransition::completed(None, Timestamp::now())));
        assert!(!purchase.apply(&PurchaseTransition::failed("x", None, Timestamp::now())));
        assert_eq!(purchase.status, PurchaseStatus::Refunded);
    }

    #[test]
    fn transitions_know_their_guard() {
        assert_eq!(
            PurchaseTransition::completed(None, Timestamp::now()).expected_from(),
            PurchaseStatus::Pending
        );
        let r = PurchaseTransition::refunded(
            refund_record(Money::from_minor(Currency::Usd, 1).unwrap()),
            None,
        );
        assert_eq!(r.expected_from(), PurchaseStatus::Completed);
    }

    #[test]
    fn full_refund_is_the_charged_amount() {
        let purchase = pending_purchase(Currency::Sar, 3.75);
        assert_eq!(purchase.refundable_amount(None).unwrap(), purchase.amount);
    }

    #[test]
    fn usd_refund_uses_snapshot_rate() {
        let purchase = pending_purchase(Currency::Sar, 3.75);
        let ten_usd = Money::from_minor(Currency::Usd, 1000).unwrap();
        let refund = purchase.refundable_amount(Some(ten_usd)).unwrap();
        assert_eq!(refund.currency(), Currency::Sar);
        assert_eq!(refund.minor_units(), 3750);
    }

    #[test]
    fn refund_larger_than_charge_is_rejected() {
        let purchase = pending_purchase(Currency::Usd, 1.0);
        let too_much = Money::from_minor(Currency::Usd, purchase.amount.minor_units() + 1).unwrap();
        assert!(matches!(
            purchase.refundable_amount(Some(too_much)),
            Err(BillingError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn refund_in_unrelated_currency_is_rejected() {
        let purchase = pending_purchase(Currency::Sar, 3.75);
        let eur = Money::from_minor(Currency::Eur, 100).unwrap();
        assert!(purchase.refundable_amount(Some(eur)).is_err());
    }
}
