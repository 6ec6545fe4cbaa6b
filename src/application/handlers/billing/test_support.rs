//! Fully wired billing stack over in-memory adapters and a mock gateway.

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::*;
use crate::adapters::gateways::MockPaymentGateway;
use crate::adapters::memory::{
    FixedRateSource, InMemoryEntitlementStore, InMemoryPurchaseRepository, InMemorySecuritySignalSink,
    InMemorySubscriptionRepository, InMemoryWebhookEventRepository, StaticUserRoleReader,
};
use crate::application::services::{
    CurrencyConverter, EntitlementResolver, GatewayRegistry, PaymentReconciler, PurchaseLedger,
    SubscriptionManager,
};
use crate::domain::billing::{BillingCycle, Currency, CustomerInfo, GatewayKind, PlanType, Purchase};
use crate::domain::entitlement::EntitlementSet;
use crate::domain::foundation::{DomainError, OrderId, SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{PeriodArithmetic, Subscription, SubscriptionEnd};
use crate::ports::{InsertOutcome, RemotePaymentState, SubscriptionRepository};

/// In-memory subscription repository whose next insert can be made to fail
/// like a dropped database connection.
#[derive(Default)]
pub(crate) struct UnreliableSubscriptionRepository {
    inner: InMemorySubscriptionRepository,
    fail_next_insert: AtomicBool,
}

impl UnreliableSubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubscriptionRepository for UnreliableSubscriptionRepository {
    async fn insert_active(&self, subscription: &Subscription) -> Result<InsertOutcome, DomainError> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(DomainError::database("connection reset"));
        }
        self.inner.insert_active(subscription).await
    }

    async fn find_active_by_user(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        self.inner.find_active_by_user(user_id).await
    }

    async fn find_by_purchase(&self, order_id: &OrderId) -> Result<Option<Subscription>, DomainError> {
        self.inner.find_by_purchase(order_id).await
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
        self.inner.list_by_user(user_id).await
    }

    async fn end_if_active(
        &self,
        id: &SubscriptionId,
        end: &SubscriptionEnd,
    ) -> Result<Option<Subscription>, DomainError> {
        self.inner.end_if_active(id, end).await
    }

    async fn find_active_ending_before(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError> {
        self.inner.find_active_ending_before(cutoff, limit).await
    }
}

pub(crate) struct BillingFixture {
    pub user: UserId,
    pub gateway: MockPaymentGateway,
    pub rates: Arc<FixedRateSource>,
    pub subscription_repo: Arc<UnreliableSubscriptionRepository>,
    pub events: Arc<InMemoryWebhookEventRepository>,
    pub signals: Arc<InMemorySecuritySignalSink>,
    pub ledger: Arc<PurchaseLedger>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub resolver: Arc<EntitlementResolver>,
    pub create_payment: CreatePaymentHandler,
    pub verify_payment: VerifyPaymentHandler,
    pub process_refund: ProcessRefundHandler,
    pub webhooks: WebhookIngestor,
    pub expire: ExpireSubscriptionsHandler,
    pub purge: PurgeWebhookEventsHandler,
    pub overview: GetBillingOverviewHandler,
}

impl BillingFixture {
    /// PayPal mock only; SAR and AED have rates, EGP does not.
    pub fn new() -> Self {
        let rates = Arc::new(FixedRateSource::new(HashMap::from([
            (Currency::Sar, 3.75),
            (Currency::Aed, 3.6725),
        ])));
        let subscription_repo = Arc::new(UnreliableSubscriptionRepository::new());
        let resolver = Arc::new(EntitlementResolver::new(
            Arc::new(InMemoryEntitlementStore::new()),
            Arc::new(StaticUserRoleReader::default()),
            subscription_repo.clone(),
        ));
        let subscriptions = Arc::new(SubscriptionManager::new(
            subscription_repo.clone(),
            resolver.clone(),
            PeriodArithmetic::Calendar,
        ));
        let ledger = Arc::new(PurchaseLedger::new(Arc::new(InMemoryPurchaseRepository::new())));
        let reconciler = Arc::new(PaymentReconciler::new(ledger.clone(), subscriptions.clone()));

        let gateway = MockPaymentGateway::new(GatewayKind::PayPal, SecretString::new("whsec_test".into()));
        let registry = Arc::new(GatewayRegistry::new().with_gateway(Arc::new(gateway.clone())));
        let events = Arc::new(InMemoryWebhookEventRepository::new());
        let signals = Arc::new(InMemorySecuritySignalSink::new());

        Self {
            user: UserId::new("user-1").unwrap(),
            create_payment: CreatePaymentHandler::new(
                registry.clone(),
                ledger.clone(),
                Arc::new(CurrencyConverter::new(rates.clone())),
            ),
            verify_payment: VerifyPaymentHandler::new(registry.clone(), reconciler.clone()),
            process_refund: ProcessRefundHandler::new(registry.clone(), reconciler.clone()),
            webhooks: WebhookIngestor::new(registry, reconciler, events.clone(), signals.clone()),
            expire: ExpireSubscriptionsHandler::new(subscriptions.clone()),
            purge: PurgeWebhookEventsHandler::new(events.clone()),
            overview: GetBillingOverviewHandler::new(resolver.clone(), subscriptions.clone(), ledger.clone()),
            gateway,
            rates,
            subscription_repo,
            events,
            signals,
            ledger,
            subscriptions,
            resolver,
        }
    }

    pub async fn purchase(&self, order_id: &OrderId) -> Purchase {
        self.ledger.find_by_order_id(order_id).await.unwrap().unwrap()
    }

    /// A pending USD checkout for the fixture user.
    pub async fn checkout(&self) -> CreatePaymentResult {
        self.create_payment.handle(checkout_command(&self.user)).await.unwrap()
    }

    /// A checkout captured through the verify path.
    pub async fn completed_checkout(&self) -> CreatePaymentResult {
        self.completed_checkout_in(Currency::Usd).await
    }

    pub async fn completed_checkout_in(&self, currency: Currency) -> CreatePaymentResult {
        let mut cmd = checkout_command(&self.user);
        cmd.currency = currency;
        let checkout = self.create_payment.handle(cmd).await.unwrap();
        self.gateway.set_payment_state(
            &checkout.payment_id,
            Some(checkout.order_id.clone()),
            RemotePaymentState::Captured,
        );
        self.verify_payment
            .handle(VerifyPaymentCommand {
                payment_id: checkout.payment_id.to_string(),
            })
            .await
            .unwrap();
        checkout
    }

    pub async fn active_subscription(&self) -> Option<Subscription> {
        self.subscriptions.active_for(&self.user).await.unwrap()
    }

    pub async fn entitlements(&self) -> EntitlementSet {
        self.resolver.resolve(&self.user).await.unwrap()
    }
}

/// INTERMEDIATE monthly in USD through PayPal.
pub(crate) fn checkout_command(user: &UserId) -> CreatePaymentCommand {
    CreatePaymentCommand {
        user_id: user.clone(),
        gateway: GatewayKind::PayPal,
        plan: PlanType::Intermediate,
        billing_cycle: BillingCycle::Monthly,
        currency: Currency::Usd,
        customer: CustomerInfo::new("learner@example.com", Some("Test Learner".into())).unwrap(),
        billing_address: None,
        return_url: "https://app.example.com/billing/return".into(),
        cancel_url: "https://app.example.com/billing/cancel".into(),
        metadata: None,
    }
}
