//! End-to-end reconciliation over the in-memory stores: checkout, the
//! verify and webhook paths racing each other, refunds, supersession and
//! expiry.

use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;

use billing_reconciler::adapters::gateways::MockPaymentGateway;
use billing_reconciler::adapters::memory::{FixedRateSource, InMemorySecuritySignalSink, StaticUserRoleReader};
use billing_reconciler::application::handlers::billing::{
    CreatePaymentCommand, CreatePaymentResult, ExpireSubscriptionsCommand, IngestWebhookCommand,
    ProcessRefundCommand, VerifyPaymentCommand, WebhookAck, WebhookOutcome,
};
use billing_reconciler::application::services::GatewayRegistry;
use billing_reconciler::application::{BillingCollaborators, BillingStack, BillingStores};
use billing_reconciler::domain::billing::{
    BillingCycle, Currency, CustomerInfo, GatewayKind, Money, PlanType, Purchase, PurchaseStatus,
};
use billing_reconciler::domain::entitlement::EntitlementSet;
use billing_reconciler::domain::foundation::{OrderId, Timestamp, UserId};
use billing_reconciler::domain::subscription::{CancellationReason, PeriodArithmetic, SubscriptionStatus};
use billing_reconciler::ports::RemotePaymentState;

// ════════════════════════════════════════════════════════════════════════════════
// Test Infrastructure
// ════════════════════════════════════════════════════════════════════════════════

struct World {
    stack: BillingStack,
    gateway: MockPaymentGateway,
    signals: Arc<InMemorySecuritySignalSink>,
    user: UserId,
}

impl World {
    fn new() -> Self {
        let gateway = MockPaymentGateway::new(GatewayKind::HyperPay, SecretString::new("whsec_world".into()));
        let signals = Arc::new(InMemorySecuritySignalSink::new());
        let stack = BillingStack::build(
            BillingStores::in_memory(),
            BillingCollaborators {
                gateways: GatewayRegistry::new().with_gateway(Arc::new(gateway.clone())),
                rates: Arc::new(FixedRateSource::new(HashMap::from([(Currency::Sar, 3.75)]))),
                roles: Arc::new(StaticUserRoleReader::new(["admin-1"])),
                signals: signals.clone(),
                period_arithmetic: PeriodArithmetic::Calendar,
            },
        );
        Self {
            stack,
            gateway,
            signals,
            user: UserId::new("learner-42").unwrap(),
        }
    }

    async fn checkout(&self, plan: PlanType) -> CreatePaymentResult {
        self.stack
            .create_payment
            .handle(CreatePaymentCommand {
                user_id: self.user.clone(),
                gateway: GatewayKind::HyperPay,
                plan,
                billing_cycle: BillingCycle::Monthly,
                currency: Currency::Sar,
                customer: CustomerInfo::new("learner@example.com", None).unwrap(),
                billing_address: None,
                return_url: "https://app.example.com/billing/return".into(),
                cancel_url: "https://app.example.com/billing/cancel".into(),
                metadata: None,
            })
            .await
            .unwrap()
    }

    fn capture_remotely(&self, checkout: &CreatePaymentResult) {
        self.gateway.set_payment_state(
            &checkout.payment_id,
            Some(checkout.order_id.clone()),
            RemotePaymentState::Captured,
        );
    }

    async fn verify(&self, checkout: &CreatePaymentResult) -> PurchaseStatus {
        self.stack
            .verify_payment
            .handle(VerifyPaymentCommand {
                payment_id: checkout.payment_id.to_string(),
            })
            .await
            .unwrap()
            .status
    }

    async fn deliver(&self, body: serde_json::Value) -> WebhookAck {
        self.stack
            .webhooks
            .ingest(IngestWebhookCommand {
                gateway: GatewayKind::HyperPay,
                request: self.gateway.signed_webhook(&body),
            })
            .await
    }

    /// Checkout captured through a webhook.
    async fn paid(&self, plan: PlanType) -> CreatePaymentResult {
        let checkout = self.checkout(plan).await;
        let ack = self
            .deliver(MockPaymentGateway::captured_event(
                &format!("evt_paid_{}", checkout.order_id),
                &checkout.order_id,
            ))
            .await;
        assert_eq!(ack.outcome, WebhookOutcome::Processed);
        checkout
    }

    async fn purchase(&self, order_id: &OrderId) -> Purchase {
        self.stack.ledger.find_by_order_id(order_id).await.unwrap().unwrap()
    }

    async fn entitlements(&self) -> EntitlementSet {
        self.stack.resolver.resolve(&self.user).await.unwrap()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Capture
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn webhook_racing_verify_activates_exactly_once() {
    let w = World::new();
    let checkout = w.checkout(PlanType::Senior).await;
    w.capture_remotely(&checkout);

    let webhook = MockPaymentGateway::captured_event("evt_race", &checkout.order_id);
    let (status, ack) = tokio::join!(w.verify(&checkout), w.deliver(webhook));

    assert_eq!(status, PurchaseStatus::Completed);
    assert!(ack.accepted);
    assert_eq!(w.purchase(&checkout.order_id).await.status, PurchaseStatus::Completed);

    let history = w.stack.subscriptions.history_for(&w.user).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SubscriptionStatus::Active);
    assert_eq!(w.entitlements().await, EntitlementSet::for_plan(PlanType::Senior));
}

#[tokio::test]
async fn redelivered_webhook_is_a_duplicate() {
    let w = World::new();
    let checkout = w.checkout(PlanType::Junior).await;
    let body = MockPaymentGateway::captured_event("evt_dup", &checkout.order_id);

    let first = w.deliver(body.clone()).await;
    let second = w.deliver(body).await;

    assert_eq!(first.outcome, WebhookOutcome::Processed);
    assert_eq!(second.outcome, WebhookOutcome::Duplicate);
    assert!(second.accepted);
    assert_eq!(w.stack.subscriptions.history_for(&w.user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn verify_after_webhook_makes_no_gateway_call() {
    let w = World::new();
    let checkout = w.paid(PlanType::Intermediate).await;

    assert_eq!(w.verify(&checkout).await, PurchaseStatus::Completed);
    assert_eq!(w.gateway.call_count("fetch_payment"), 0);
}

#[tokio::test]
async fn late_failure_does_not_undo_capture() {
    let w = World::new();
    let checkout = w.paid(PlanType::Senior).await;

    let ack = w
        .deliver(MockPaymentGateway::failed_event("evt_late_fail", &checkout.order_id, "timeout"))
        .await;

    assert!(ack.accepted);
    assert_eq!(w.purchase(&checkout.order_id).await.status, PurchaseStatus::Completed);
    assert!(w.stack.subscriptions.active_for(&w.user).await.unwrap().is_some());
}

#[tokio::test]
async fn forged_webhook_is_rejected_and_reported() {
    let w = World::new();
    let checkout = w.checkout(PlanType::Senior).await;
    let mut request = w
        .gateway
        .signed_webhook(&MockPaymentGateway::captured_event("evt_forged", &checkout.order_id));
    request.body = MockPaymentGateway::captured_event("evt_forged", &OrderId::generate())
        .to_string()
        .into_bytes();

    let ack = w
        .stack
        .webhooks
        .ingest(IngestWebhookCommand {
            gateway: GatewayKind::HyperPay,
            request: request.with_source_ip(Some("203.0.113.9".into())),
        })
        .await;

    assert_eq!(ack.outcome, WebhookOutcome::Unauthenticated);
    assert!(!ack.accepted);
    assert_eq!(w.purchase(&checkout.order_id).await.status, PurchaseStatus::Pending);
    let signals = w.signals.signals();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].source_ip.as_deref(), Some("203.0.113.9"));
}

// ════════════════════════════════════════════════════════════════════════════════
// Plan Changes
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn new_purchase_supersedes_active_subscription() {
    let w = World::new();
    let senior = w.paid(PlanType::Senior).await;
    let bundle = w.paid(PlanType::Bundle).await;

    let history = w.stack.subscriptions.history_for(&w.user).await.unwrap();
    assert_eq!(history.len(), 2);

    let active = w.stack.subscriptions.active_for(&w.user).await.unwrap().unwrap();
    assert_eq!(active.purchase_id, bundle.order_id);
    assert_eq!(active.plan, PlanType::Bundle);

    let old = history.iter().find(|s| s.purchase_id == senior.order_id).unwrap();
    assert_eq!(old.status, SubscriptionStatus::Cancelled);
    assert_eq!(old.cancellation_reason, Some(CancellationReason::Superseded));
    assert_eq!(w.entitlements().await, EntitlementSet::for_plan(PlanType::Bundle));
}

// ════════════════════════════════════════════════════════════════════════════════
// Refunds
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn refund_webhook_revokes_entitlements() {
    let w = World::new();
    let checkout = w.paid(PlanType::Senior).await;

    let ack = w
        .deliver(MockPaymentGateway::refunded_event(
            "evt_refund",
            &checkout.order_id,
            "rf_900",
            &checkout.amount,
        ))
        .await;

    assert_eq!(ack.outcome, WebhookOutcome::Processed);
    let purchase = w.purchase(&checkout.order_id).await;
    assert_eq!(purchase.status, PurchaseStatus::Refunded);
    assert_eq!(purchase.refund.unwrap().refund_id.as_str(), "rf_900");
    assert!(w.stack.subscriptions.active_for(&w.user).await.unwrap().is_none());
    assert_eq!(w.entitlements().await, EntitlementSet::free());
}

#[tokio::test]
async fn refund_api_then_refund_webhook_stays_single() {
    let w = World::new();
    let checkout = w.paid(PlanType::Junior).await;

    let refunded = w
        .stack
        .process_refund
        .handle(ProcessRefundCommand {
            payment_id: checkout.payment_id.to_string(),
            amount: None,
            reason: "duplicate purchase".into(),
        })
        .await
        .unwrap();
    let ack = w
        .deliver(MockPaymentGateway::refunded_event(
            "evt_refund_echo",
            &checkout.order_id,
            refunded.refund_id.as_str(),
            &refunded.amount,
        ))
        .await;

    assert!(ack.accepted);
    let purchase = w.purchase(&checkout.order_id).await;
    assert_eq!(purchase.status, PurchaseStatus::Refunded);
    assert_eq!(purchase.refund.unwrap().refund_id, refunded.refund_id);
    assert_eq!(w.gateway.call_count("refund"), 1);
}

#[tokio::test]
async fn partial_refund_in_usd_converts_at_snapshot_rate() {
    let w = World::new();
    let checkout = w.paid(PlanType::Senior).await;

    let result = w
        .stack
        .process_refund
        .handle(ProcessRefundCommand {
            payment_id: checkout.payment_id.to_string(),
            amount: Some(Money::parse_decimal(Currency::Usd, "2.00").unwrap()),
            reason: "goodwill".into(),
        })
        .await
        .unwrap();

    assert_eq!(result.amount, Money::parse_decimal(Currency::Sar, "7.50").unwrap());
}

// ════════════════════════════════════════════════════════════════════════════════
// Expiry
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn sweep_expires_ended_periods_only() {
    let w = World::new();
    w.paid(PlanType::Senior).await;

    let early = w
        .stack
        .expire_subscriptions
        .handle(ExpireSubscriptionsCommand::at(Timestamp::now().add_days(5)))
        .await
        .unwrap();
    assert!(early.expired.is_empty());

    let late = w
        .stack
        .expire_subscriptions
        .handle(ExpireSubscriptionsCommand::at(Timestamp::now().add_days(40)))
        .await
        .unwrap();
    assert_eq!(late.expired.len(), 1);

    let history = w.stack.subscriptions.history_for(&w.user).await.unwrap();
    assert_eq!(history[0].status, SubscriptionStatus::Expired);
    assert_eq!(w.entitlements().await, EntitlementSet::free());
}

#[tokio::test]
async fn refund_after_expiry_keeps_expired_status() {
    let w = World::new();
    let checkout = w.paid(PlanType::Senior).await;
    w.stack
        .expire_subscriptions
        .handle(ExpireSubscriptionsCommand::at(Timestamp::now().add_days(40)))
        .await
        .unwrap();

    w.deliver(MockPaymentGateway::refunded_event(
        "evt_refund_late",
        &checkout.order_id,
        "rf_late",
        &checkout.amount,
    ))
    .await;

    assert_eq!(w.purchase(&checkout.order_id).await.status, PurchaseStatus::Refunded);
    let history = w.stack.subscriptions.history_for(&w.user).await.unwrap();
    assert_eq!(history[0].status, SubscriptionStatus::Expired);
}
