//! HTTP DTOs (Data Transfer Objects) for billing endpoints.
//!
//! These types define the JSON request/response structure for the billing API.
//! They serve as the boundary between HTTP and the application layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::handlers::billing::{
    BillingOverview, CreatePaymentResult, ExpireSubscriptionsResult, ProcessRefundResult,
    VerifyPaymentResult,
};
use crate::domain::billing::{
    BillingAddress, BillingCycle, Currency, Money, PlanType, PriceSnapshot, PurchaseStatus,
};
use crate::domain::entitlement::EntitlementSet;
use crate::domain::subscription::{CancellationReason, Subscription, SubscriptionStatus};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start a checkout. The gateway comes from the path.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequest {
    pub plan: PlanType,
    pub billing_cycle: BillingCycle,
    pub currency: Currency,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub billing_address: Option<BillingAddress>,
    pub return_url: String,
    pub cancel_url: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Request to check a payment with its gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentRequest {
    pub payment_id: String,
}

/// Request to refund a payment.
#[derive(Debug, Clone, Deserialize)]
pub struct RefundPaymentRequest {
    pub payment_id: String,
    /// Decimal string, e.g. `"10.00"`. Omit for a full refund.
    #[serde(default)]
    pub amount: Option<String>,
    /// Currency of `amount`. Defaults to USD.
    #[serde(default)]
    pub currency: Option<Currency>,
    pub reason: String,
}

/// Request to run the expiry sweep now.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpireSubscriptionsRequest {
    #[serde(default)]
    pub batch_size: Option<u32>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Response for a started checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub payment_id: String,
    /// Where to send the customer.
    pub checkout_url: String,
    pub amount: Money,
    pub price_snapshot: PriceSnapshotResponse,
}

impl From<CreatePaymentResult> for CheckoutResponse {
    fn from(result: CreatePaymentResult) -> Self {
        Self {
            order_id: result.order_id.to_string(),
            payment_id: result.payment_id.to_string(),
            checkout_url: result.checkout_url,
            amount: result.amount,
            price_snapshot: PriceSnapshotResponse::from(result.price_snapshot),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceSnapshotResponse {
    pub base_amount: Money,
    pub exchange_rate: f64,
    pub settlement_currency: Currency,
    /// ISO 8601
    pub captured_at: String,
}

impl From<PriceSnapshot> for PriceSnapshotResponse {
    fn from(snapshot: PriceSnapshot) -> Self {
        Self {
            base_amount: snapshot.base_currency_amount,
            exchange_rate: snapshot.exchange_rate_used,
            settlement_currency: snapshot.settlement_currency,
            captured_at: snapshot.captured_at.as_datetime().to_rfc3339(),
        }
    }
}

/// Response for a verified payment.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyPaymentResponse {
    pub order_id: String,
    pub payment_id: String,
    pub status: PurchaseStatus,
    /// True if this call moved the purchase.
    pub changed: bool,
}

impl From<VerifyPaymentResult> for VerifyPaymentResponse {
    fn from(result: VerifyPaymentResult) -> Self {
        Self {
            order_id: result.order_id.to_string(),
            payment_id: result.payment_id.to_string(),
            status: result.status,
            changed: result.changed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundResponse {
    pub order_id: String,
    pub refund_id: String,
    pub amount: Money,
    pub already_refunded: bool,
}

impl From<ProcessRefundResult> for RefundResponse {
    fn from(result: ProcessRefundResult) -> Self {
        Self {
            order_id: result.order_id.to_string(),
            refund_id: result.refund_id.to_string(),
            amount: result.amount,
            already_refunded: result.already_refunded,
        }
    }
}

/// Resolved tokens for the current user.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementsResponse {
    pub user_id: String,
    pub plan: PlanType,
    pub entitlements: Vec<String>,
}

impl EntitlementsResponse {
    pub fn new(user_id: impl Into<String>, set: &EntitlementSet) -> Self {
        Self {
            user_id: user_id.into(),
            plan: set.plan,
            entitlements: set.tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub id: String,
    pub order_id: String,
    pub plan: PlanType,
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
    pub current_period_start: String,
    pub current_period_end: String,
    pub entitlements: Vec<String>,
    pub cancellation_reason: Option<CancellationReason>,
    pub ended_at: Option<String>,
}

impl From<&Subscription> for SubscriptionResponse {
    fn from(subscription: &Subscription) -> Self {
        Self {
            id: subscription.id.to_string(),
            order_id: subscription.purchase_id.to_string(),
            plan: subscription.plan,
            billing_cycle: subscription.billing_cycle,
            status: subscription.status,
            current_period_start: subscription.current_period_start.as_datetime().to_rfc3339(),
            current_period_end: subscription.current_period_end.as_datetime().to_rfc3339(),
            entitlements: subscription.entitlements.clone(),
            cancellation_reason: subscription.cancellation_reason,
            ended_at: subscription.ended_at.map(|t| t.as_datetime().to_rfc3339()),
        }
    }
}

/// Active subscription plus full history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionsResponse {
    pub active: Option<SubscriptionResponse>,
    pub history: Vec<SubscriptionResponse>,
}

impl From<&BillingOverview> for SubscriptionsResponse {
    fn from(overview: &BillingOverview) -> Self {
        Self {
            active: overview.active_subscription.as_ref().map(SubscriptionResponse::from),
            history: overview.history.iter().map(SubscriptionResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpireSubscriptionsResponse {
    pub expired: Vec<String>,
}

impl From<ExpireSubscriptionsResult> for ExpireSubscriptionsResponse {
    fn from(result: ExpireSubscriptionsResult) -> Self {
        Self {
            expired: result.expired.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub gateways: Vec<String>,
}

/// Error body for every failed request.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    /// Present on gateway failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: None,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}
