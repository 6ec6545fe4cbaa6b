//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod billing;

pub use billing::{
    // Checkout and reconciliation
    CreatePaymentCommand, CreatePaymentHandler, CreatePaymentResult,
    VerifyPaymentCommand, VerifyPaymentHandler, VerifyPaymentResult,
    ProcessRefundCommand, ProcessRefundHandler, ProcessRefundResult,
    IngestWebhookCommand, WebhookAck, WebhookIngestor, WebhookOutcome,
    // Maintenance
    ExpireSubscriptionsCommand, ExpireSubscriptionsHandler, ExpireSubscriptionsResult,
    PurgeWebhookEventsCommand, PurgeWebhookEventsHandler, PurgeWebhookEventsResult,
    // Queries
    BillingOverview, GetBillingOverviewHandler, GetBillingOverviewQuery,
};
