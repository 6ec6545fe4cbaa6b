//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to the billing command/query handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts, Json, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::application::handlers::billing::{
    CreatePaymentCommand, CreatePaymentHandler, ExpireSubscriptionsCommand, ExpireSubscriptionsHandler,
    GetBillingOverviewHandler, GetBillingOverviewQuery, IngestWebhookCommand, ProcessRefundCommand,
    ProcessRefundHandler, VerifyPaymentCommand, VerifyPaymentHandler, WebhookAck, WebhookIngestor,
    DEFAULT_EXPIRY_BATCH_SIZE,
};
use crate::application::services::{EntitlementResolver, GatewayRegistry};
use crate::application::BillingStack;
use crate::domain::billing::{BillingError, Currency, CustomerInfo, GatewayKind, Money};
use crate::domain::entitlement::UserRole;
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{UserRoleReader, WebhookRequest};

use super::dto::{
    CheckoutResponse, CreateCheckoutRequest, EntitlementsResponse, ErrorResponse,
    ExpireSubscriptionsRequest, ExpireSubscriptionsResponse, HealthResponse, RefundPaymentRequest,
    RefundResponse, SubscriptionsResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the billing routes. Cloned per request.
#[derive(Clone)]
pub struct BillingAppState {
    pub gateways: Arc<GatewayRegistry>,
    pub resolver: Arc<EntitlementResolver>,
    pub roles: Arc<dyn UserRoleReader>,
    pub create_payment: Arc<CreatePaymentHandler>,
    pub verify_payment: Arc<VerifyPaymentHandler>,
    pub process_refund: Arc<ProcessRefundHandler>,
    pub webhooks: Arc<WebhookIngestor>,
    pub expire_subscriptions: Arc<ExpireSubscriptionsHandler>,
    pub overview: Arc<GetBillingOverviewHandler>,
}

impl From<&BillingStack> for BillingAppState {
    fn from(stack: &BillingStack) -> Self {
        Self {
            gateways: stack.gateways.clone(),
            resolver: stack.resolver.clone(),
            roles: stack.roles.clone(),
            create_payment: stack.create_payment.clone(),
            verify_payment: stack.verify_payment.clone(),
            process_refund: stack.process_refund.clone(),
            webhooks: stack.webhooks.clone(),
            expire_subscriptions: stack.expire_subscriptions.clone(),
            overview: stack.overview.clone(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity from the `X-User-Id` header set by the upstream gateway.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user_id: UserId,
}

pub enum AdminRejection {
    Unauthenticated(AuthenticationRequired),
    Forbidden,
    RoleLookupFailed(BillingError),
}

impl IntoResponse for AdminRejection {
    fn into_response(self) -> axum::response::Response {
        match self {
            AdminRejection::Unauthenticated(rejection) => rejection.into_response(),
            AdminRejection::Forbidden => {
                let error = ErrorResponse::new("FORBIDDEN", "Admin role is required");
                (StatusCode::FORBIDDEN, Json(error)).into_response()
            }
            AdminRejection::RoleLookupFailed(err) => BillingApiError(err).into_response(),
        }
    }
}

#[async_trait]
impl FromRequestParts<BillingAppState> for AdminUser {
    type Rejection = AdminRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &BillingAppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state)
            .await
            .map_err(AdminRejection::Unauthenticated)?;
        let role = state
            .roles
            .role_of(&user.user_id)
            .await
            .map_err(|e| AdminRejection::RoleLookupFailed(e.into()))?;
        if role != UserRole::Admin {
            tracing::warn!(user_id = %user.user_id, "Admin endpoint refused");
            return Err(AdminRejection::Forbidden);
        }
        Ok(AdminUser { user_id: user.user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Payment Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/payments/:gateway/checkout - Start a checkout
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Path(gateway): Path<String>,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let gateway: GatewayKind = gateway.parse().map_err(BillingError::from)?;
    let cmd = CreatePaymentCommand {
        user_id: user.user_id,
        gateway,
        plan: request.plan,
        billing_cycle: request.billing_cycle,
        currency: request.currency,
        customer: CustomerInfo::new(request.email, request.name).map_err(BillingError::from)?,
        billing_address: request.billing_address,
        return_url: request.return_url,
        cancel_url: request.cancel_url,
        metadata: request.metadata,
    };

    let result = state.create_payment.handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(result))))
}

/// POST /api/payments/verify - Check a payment with its gateway
pub async fn verify_payment(
    State(state): State<BillingAppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = VerifyPaymentCommand {
        payment_id: request.payment_id,
    };

    let result = state.verify_payment.handle(cmd).await?;

    Ok(Json(VerifyPaymentResponse::from(result)))
}

/// POST /api/payments/refund - Refund a completed payment
pub async fn refund_payment(
    State(state): State<BillingAppState>,
    _admin: AdminUser,
    Json(request): Json<RefundPaymentRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let amount = match request.amount.as_deref() {
        Some(value) => {
            let currency = request.currency.unwrap_or(Currency::Usd);
            Some(Money::parse_decimal(currency, value).map_err(BillingError::from)?)
        }
        None => None,
    };
    let cmd = ProcessRefundCommand {
        payment_id: request.payment_id,
        amount,
        reason: request.reason,
    };

    let result = state.process_refund.handle(cmd).await?;

    Ok(Json(RefundResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Handler
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/:gateway - Ingest a gateway webhook
///
/// Always 200; the outcome is in the body.
pub async fn handle_webhook(
    State(state): State<BillingAppState>,
    Path(gateway): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Json<WebhookAck> {
    let gateway: GatewayKind = match gateway.parse() {
        Ok(kind) => kind,
        Err(_) => {
            tracing::warn!(gateway = %gateway, "Webhook for unknown gateway");
            return Json(WebhookAck::unknown_gateway());
        }
    };

    let mut request = WebhookRequest::new(body.to_vec(), Timestamp::now())
        .with_source_ip(source_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr)));
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    Json(state.webhooks.ingest(IngestWebhookCommand { gateway, request }).await)
}

/// First `X-Forwarded-For` hop, else the peer address.
fn source_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

// ════════════════════════════════════════════════════════════════════════════════
// Billing Queries
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/billing/entitlements - Resolved tokens for the caller
pub async fn get_entitlements(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let set = state
        .resolver
        .resolve(&user.user_id)
        .await
        .map_err(BillingError::from)?;
    Ok(Json(EntitlementsResponse::new(user.user_id.as_str(), &set)))
}

/// GET /api/billing/subscriptions - Active subscription and history
pub async fn get_subscriptions(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let overview = state
        .overview
        .handle(GetBillingOverviewQuery {
            user_id: user.user_id,
        })
        .await?;
    Ok(Json(SubscriptionsResponse::from(&overview)))
}

/// POST /api/billing/subscriptions/expire - Run the expiry sweep now
pub async fn expire_subscriptions(
    State(state): State<BillingAppState>,
    admin: AdminUser,
    request: Option<Json<ExpireSubscriptionsRequest>>,
) -> Result<impl IntoResponse, BillingApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let cmd = ExpireSubscriptionsCommand {
        now: Timestamp::now(),
        batch_size: request.batch_size.unwrap_or(DEFAULT_EXPIRY_BATCH_SIZE),
    };

    let result = state.expire_subscriptions.handle(cmd).await?;
    tracing::info!(admin = %admin.user_id, expired = result.expired.len(), "Manual expiry sweep");

    Ok(Json(ExpireSubscriptionsResponse::from(result)))
}

/// GET /health - Liveness
pub async fn health(State(state): State<BillingAppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        gateways: state
            .gateways
            .configured()
            .into_iter()
            .map(|kind| kind.to_string())
            .collect(),
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl BillingApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            BillingError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            BillingError::InvalidIdentifierFormat { .. } | BillingError::ValidationFailed { .. } => {
                StatusCode::BAD_REQUEST
            }
            BillingError::GatewayRequestFailed { .. } => StatusCode::BAD_GATEWAY,
            BillingError::SignatureInvalid(_) => StatusCode::UNAUTHORIZED,
            BillingError::PurchaseNotFound(_) => StatusCode::NOT_FOUND,
            BillingError::PurchaseNotRefundable { .. } | BillingError::IllegalTransition { .. } => {
                StatusCode::CONFLICT
            }
            BillingError::ExchangeRateUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BillingError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "Billing request failed");
        }

        let mut body = ErrorResponse::new(self.0.code(), self.0.message());
        if let BillingError::GatewayRequestFailed { retryable, .. } = &self.0 {
            body = body.with_retryable(*retryable);
        }
        (status, Json(body)).into_response()
    }
}
