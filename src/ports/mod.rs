//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Gateway Ports
//!
//! - `PaymentGateway` - One contract implemented per payment provider
//! - `HttpTransport` - Outbound HTTP used by gateway adapters
//! - `ExchangeRateSource` - USD exchange rates read at pricing time
//!
//! ## Persistence Ports
//!
//! - `PurchaseRepository` - Guarded purchase transitions
//! - `SubscriptionRepository` - Single-active-subscription store
//! - `EntitlementStore` - Last computed entitlement set per user
//! - `WebhookEventRepository` - Webhook idempotency tracking
//!
//! ## Collaborator Ports
//!
//! - `UserRoleReader` - Roles owned by the account subsystem
//! - `SecuritySignalSink` - Signature failures for intrusion detection

mod entitlement_store;
mod exchange_rate_source;
mod http_transport;
mod payment_gateway;
mod purchase_repository;
mod security_signal;
mod subscription_repository;
mod webhook_event_repository;

pub use entitlement_store::{EntitlementStore, UserRoleReader};
pub use exchange_rate_source::ExchangeRateSource;
pub use http_transport::{HttpAuth, HttpBody, HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportError};
pub use payment_gateway::{
    CheckoutRequest, CheckoutSession, GatewayError, GatewayErrorCode, PaymentGateway, PaymentLookup,
    RefundConfirmation, RefundRequest, RemotePaymentState, WebhookRequest,
};
pub use purchase_repository::{PurchaseRepository, TransitionOutcome};
pub use security_signal::{SecuritySignal, SecuritySignalSink};
pub use subscription_repository::{InsertOutcome, SubscriptionRepository};
pub use webhook_event_repository::{
    SaveResult, WebhookEventRecord, WebhookEventRepository, WebhookEventResult,
};
