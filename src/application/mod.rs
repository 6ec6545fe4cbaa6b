//! Application layer - Commands, Queries, Handlers, and the services they share.
//!
//! Handlers orchestrate one operation each. Services hold the rules several
//! handlers depend on (guarded ledger writes, subscription lifecycle,
//! entitlement resolution), so webhook and polling paths cannot drift apart.

mod billing_stack;
pub mod handlers;
pub mod services;

pub use billing_stack::{BillingCollaborators, BillingStack, BillingStores};

pub use handlers::{
    BillingOverview, CreatePaymentCommand, CreatePaymentHandler, CreatePaymentResult,
    ExpireSubscriptionsCommand, ExpireSubscriptionsHandler, GetBillingOverviewHandler,
    GetBillingOverviewQuery, IngestWebhookCommand, ProcessRefundCommand, ProcessRefundHandler,
    PurgeWebhookEventsCommand, PurgeWebhookEventsHandler, VerifyPaymentCommand, VerifyPaymentHandler,
    WebhookAck, WebhookIngestor, WebhookOutcome,
};
pub use services::{
    CurrencyConverter, EntitlementResolver, GatewayRegistry, PaymentReconciler, PurchaseLedger,
    SubscriptionManager,
};
