//! In-memory adapters for tests and for running without a database.

mod entitlement_store;
mod purchase_repository;
mod rate_source;
mod security_signal;
mod subscription_repository;
mod webhook_event_repository;

pub use entitlement_store::{InMemoryEntitlementStore, StaticUserRoleReader};
pub use purchase_repository::InMemoryPurchaseRepository;
pub use rate_source::FixedRateSource;
pub use security_signal::InMemorySecuritySignalSink;
pub use subscription_repository::InMemorySubscriptionRepository;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
