//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    create_checkout, expire_subscriptions, get_entitlements, get_subscriptions, handle_webhook, health,
    refund_payment, verify_payment, BillingAppState,
};

/// Payment routes, mounted at `/api/payments`.
///
/// - `POST /:gateway/checkout` - Start a checkout (X-User-Id)
/// - `POST /verify` - Check a payment with its gateway
/// - `POST /refund` - Refund a completed payment (admin)
pub fn payment_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/:gateway/checkout", post(create_checkout))
        .route("/verify", post(verify_payment))
        .route("/refund", post(refund_payment))
}

/// Webhook routes, mounted at `/api/webhooks`.
///
/// No user authentication; each gateway's signature is checked instead.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/:gateway", post(handle_webhook))
}

/// Billing state routes, mounted at `/api/billing`.
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/entitlements", get(get_entitlements))
        .route("/subscriptions", get(get_subscriptions))
        .route("/subscriptions/expire", post(expire_subscriptions))
}

/// All billing routes plus `/health`, ready for `with_state`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/api/payments", payment_routes())
        .nest("/api/webhooks", webhook_routes())
        .nest("/api/billing", billing_routes())
        .route("/health", get(health))
}
