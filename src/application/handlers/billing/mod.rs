//! Billing command and query handlers.
//!
//! Each gateway-agnostic operation is one handler over `PaymentGateway`:
//! - `CreatePaymentHandler` - start a checkout
//! - `VerifyPaymentHandler` - client-driven status check
//! - `ProcessRefundHandler` - refund a completed purchase
//! - `WebhookIngestor` - authenticated, deduplicated webhook processing
//!
//! Maintenance:
//! - `ExpireSubscriptionsHandler` - period-end sweep
//! - `PurgeWebhookEventsHandler` - dedupe record retention
//!
//! Queries:
//! - `GetBillingOverviewHandler` - entitlements, subscriptions, purchases

mod create_payment;
mod expire_subscriptions;
mod get_billing_overview;
mod ingest_webhook;
mod process_refund;
mod purge_webhook_events;
mod verify_payment;

#[cfg(test)]
pub(crate) mod test_support;

pub use create_payment::{CreatePaymentCommand, CreatePaymentHandler, CreatePaymentResult};
pub use expire_subscriptions::{
    ExpireSubscriptionsCommand, ExpireSubscriptionsHandler, ExpireSubscriptionsResult,
    DEFAULT_EXPIRY_BATCH_SIZE,
};
pub use get_billing_overview::{BillingOverview, GetBillingOverviewHandler, GetBillingOverviewQuery};
pub use ingest_webhook::{IngestWebhookCommand, WebhookAck, WebhookIngestor, WebhookOutcome};
pub use process_refund::{ProcessRefundCommand, ProcessRefundHandler, ProcessRefundResult};
pub use purge_webhook_events::{PurgeWebhookEventsCommand, PurgeWebhookEventsHandler, PurgeWebhookEventsResult};
pub use verify_payment::{VerifyPaymentCommand, VerifyPaymentHandler, VerifyPaymentResult};
