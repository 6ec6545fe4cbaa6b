//! Wires the billing services and handlers over one set of stores.

use std::sync::Arc;

use super::handlers::billing::{
    CreatePaymentHandler, ExpireSubscriptionsHandler, GetBillingOverviewHandler, ProcessRefundHandler,
    PurgeWebhookEventsHandler, VerifyPaymentHandler, WebhookIngestor,
};
use super::services::{
    CurrencyConverter, EntitlementResolver, GatewayRegistry, PaymentReconciler, PurchaseLedger,
    SubscriptionManager,
};
use crate::adapters::memory::{
    InMemoryEntitlementStore, InMemoryPurchaseRepository, InMemorySubscriptionRepository,
    InMemoryWebhookEventRepository,
};
use crate::domain::subscription::PeriodArithmetic;
use crate::ports::{
    EntitlementStore, ExchangeRateSource, PurchaseRepository, SecuritySignalSink, SubscriptionRepository,
    UserRoleReader, WebhookEventRepository,
};

/// The persistence ports one deployment runs on.
#[derive(Clone)]
pub struct BillingStores {
    pub purchases: Arc<dyn PurchaseRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub entitlements: Arc<dyn EntitlementStore>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
}

impl BillingStores {
    pub fn in_memory() -> Self {
        Self {
            purchases: Arc::new(InMemoryPurchaseRepository::new()),
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            entitlements: Arc::new(InMemoryEntitlementStore::new()),
            webhook_events: Arc::new(InMemoryWebhookEventRepository::new()),
        }
    }
}

/// Non-storage collaborators.
pub struct BillingCollaborators {
    pub gateways: GatewayRegistry,
    pub rates: Arc<dyn ExchangeRateSource>,
    pub roles: Arc<dyn UserRoleReader>,
    pub signals: Arc<dyn SecuritySignalSink>,
    pub period_arithmetic: PeriodArithmetic,
}

/// Every handler, built once and shared.
#[derive(Clone)]
pub struct BillingStack {
    pub gateways: Arc<GatewayRegistry>,
    pub ledger: Arc<PurchaseLedger>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub resolver: Arc<EntitlementResolver>,
    pub roles: Arc<dyn UserRoleReader>,
    pub create_payment: Arc<CreatePaymentHandler>,
    pub verify_payment: Arc<VerifyPaymentHandler>,
    pub process_refund: Arc<ProcessRefundHandler>,
    pub webhooks: Arc<WebhookIngestor>,
    pub expire_subscriptions: Arc<ExpireSubscriptionsHandler>,
    pub purge_webhook_events: Arc<PurgeWebhookEventsHandler>,
    pub overview: Arc<GetBillingOverviewHandler>,
}

impl BillingStack {
    pub fn build(stores: BillingStores, collaborators: BillingCollaborators) -> Self {
        let gateways = Arc::new(collaborators.gateways);
        let resolver = Arc::new(EntitlementResolver::new(
            stores.entitlements,
            collaborators.roles.clone(),
            stores.subscriptions.clone(),
        ));
        let subscriptions = Arc::new(SubscriptionManager::new(
            stores.subscriptions,
            resolver.clone(),
            collaborators.period_arithmetic,
        ));
        let ledger = Arc::new(PurchaseLedger::new(stores.purchases));
        let reconciler = Arc::new(PaymentReconciler::new(ledger.clone(), subscriptions.clone()));
        let converter = Arc::new(CurrencyConverter::new(collaborators.rates));

        Self {
            create_payment: Arc::new(CreatePaymentHandler::new(gateways.clone(), ledger.clone(), converter)),
            verify_payment: Arc::new(VerifyPaymentHandler::new(gateways.clone(), reconciler.clone())),
            process_refund: Arc::new(ProcessRefundHandler::new(gateways.clone(), reconciler.clone())),
            webhooks: Arc::new(WebhookIngestor::new(
                gateways.clone(),
                reconciler,
                stores.webhook_events.clone(),
                collaborators.signals,
            )),
            expire_subscriptions: Arc::new(ExpireSubscriptionsHandler::new(subscriptions.clone())),
            purge_webhook_events: Arc::new(PurgeWebhookEventsHandler::new(stores.webhook_events)),
            overview: Arc::new(GetBillingOverviewHandler::new(
                resolver.clone(),
                subscriptions.clone(),
                ledger.clone(),
            )),
            roles: collaborators.roles,
            gateways,
            ledger,
            subscriptions,
            resolver,
        }
    }
}
