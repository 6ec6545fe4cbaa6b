//! HTTP adapter for billing endpoints.
//!
//! - `POST /api/payments/:gateway/checkout` - Start a checkout
//! - `POST /api/payments/verify` - Verify a payment
//! - `POST /api/payments/refund` - Refund a payment
//! - `POST /api/webhooks/:gateway` - Gateway webhooks
//! - `GET /api/billing/entitlements` - Resolved entitlements
//! - `GET /api/billing/subscriptions` - Active subscription and history
//! - `POST /api/billing/subscriptions/expire` - Expiry sweep
//! - `GET /health` - Liveness

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{AuthenticatedUser, BillingApiError, BillingAppState};
pub use routes::billing_router;
