//! Payment gateway port - one contract, one implementation per provider.
//!
//! Implementations own the provider-specific wire translation only: they
//! never read or write purchases. Reconciliation on top of this port is
//! gateway-agnostic.
//!
//! # Design
//!
//! - **Uniform**: every gateway answers the same five questions
//! - **Translation only**: storage and state machines live above this port
//! - **Authenticity first**: `verify_webhook` rejects before parsing business fields

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::billing::{
    BillingAddress, BillingCycle, BillingError, Currency, CustomerInfo, GatewayKind, Money, PlanType,
};
use crate::domain::foundation::{OrderId, PaymentId, RefundId, Timestamp};
use crate::domain::webhook::{GatewayEvent, WebhookError};

use super::http_transport::TransportError;

/// Port for an external payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Which gateway this is.
    fn kind(&self) -> GatewayKind;

    /// Whether the gateway settles in `currency`.
    fn supports_currency(&self, currency: Currency) -> bool;

    /// Opens a hosted checkout for an already-persisted pending purchase.
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError>;

    /// Looks up (and where the gateway needs it, captures) a payment.
    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<PaymentLookup, GatewayError>;

    /// Refunds some or all of a completed payment.
    async fn refund(&self, request: &RefundRequest) -> Result<RefundConfirmation, GatewayError>;

    /// Authenticates an inbound webhook and normalizes it.
    ///
    /// Must run the signature check before trusting any field of the body.
    fn verify_webhook(&self, request: &WebhookRequest) -> Result<GatewayEvent, WebhookError>;
}

/// Request to open a checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Our order id; echoed back by the gateway in webhooks.
    pub order_id: OrderId,
    pub plan: PlanType,
    pub billing_cycle: BillingCycle,
    /// Settlement amount to charge.
    pub amount: Money,
    pub customer: CustomerInfo,
    pub billing_address: Option<BillingAddress>,
    pub return_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Line-item description shown on the gateway's page.
    pub fn description(&self) -> String {
        format!("{} plan ({})", self.plan, self.billing_cycle)
    }
}

/// A checkout the customer can be redirected to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Gateway-assigned payment id.
    pub payment_id: PaymentId,
    pub checkout_url: String,
    /// Raw gateway response, kept for audit.
    pub raw: Value,
}

/// State of a payment as the gateway reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RemotePaymentState {
    /// Not yet paid (created, approved but not captured, in review).
    Pending,
    Captured,
    Failed { reason: String },
    Refunded,
}

/// Result of a status lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLookup {
    pub payment_id: PaymentId,
    /// Our order id when the gateway echoes it back.
    pub order_id: Option<OrderId>,
    pub state: RemotePaymentState,
    pub raw: Value,
}

/// Request to refund a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub amount: Money,
    pub reason: String,
    /// Last stored gateway response; some gateways refund by a secondary id
    /// (e.g. a capture id) found there.
    pub gateway_response: Option<Value>,
}

/// The gateway's acknowledgement of a refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundConfirmation {
    pub refund_id: RefundId,
    pub raw: Value,
}

/// Raw inbound webhook as received over HTTP.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub body: Vec<u8>,
    /// Header names are stored lowercase.
    headers: HashMap<String, String>,
    pub source_ip: Option<String>,
    pub received_at: Timestamp,
}

impl WebhookRequest {
    pub fn new(body: impl Into<Vec<u8>>, received_at: Timestamp) -> Self {
        Self {
            body: body.into(),
            headers: HashMap::new(),
            source_ip: None,
            received_at,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_source_ip(mut self, ip: Option<String>) -> Self {
        self.source_ip = ip;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Gateway call failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
    /// Provider's own error code, when it sent one.
    pub provider_code: Option<String>,
    pub retryable: bool,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NetworkError, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::AuthenticationError, message)
    }

    pub fn declined(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Declined, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(GatewayErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidResponse, message)
    }

    pub fn unsupported_currency(gateway: GatewayKind, currency: Currency) -> Self {
        Self::new(
            GatewayErrorCode::UnsupportedCurrency,
            format!("{} does not settle in {}", gateway, currency),
        )
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let code = match status {
            401 | 403 => GatewayErrorCode::AuthenticationError,
            404 => GatewayErrorCode::NotFound,
            429 => GatewayErrorCode::RateLimitExceeded,
            500..=599 => GatewayErrorCode::ProviderError,
            _ => GatewayErrorCode::Rejected,
        };
        let snippet: String = body.chars().take(200).collect();
        Self::new(code, format!("HTTP {}: {}", status, snippet))
    }

    /// Lifts into the billing taxonomy for the given gateway.
    pub fn into_billing(self, gateway: GatewayKind) -> BillingError {
        BillingError::gateway_failed(gateway, self.to_string(), self.retryable)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => GatewayError::timeout(msg),
            TransportError::Connect(msg) => GatewayError::network(msg),
            TransportError::Other(msg) => GatewayError::network(msg),
        }
    }
}

/// Gateway error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorCode {
    /// Request exceeded its time budget.
    Timeout,
    /// Network connectivity issue.
    NetworkError,
    /// Credentials rejected.
    AuthenticationError,
    /// Payment declined by the gateway.
    Declined,
    /// Resource not found.
    NotFound,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Gateway does not settle in the requested currency.
    UnsupportedCurrency,
    /// Gateway returned something we could not interpret.
    InvalidResponse,
    /// Gateway refused the request (4xx).
    Rejected,
    /// Gateway-side failure (5xx).
    ProviderError,
}

impl GatewayErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::Timeout
                | GatewayErrorCode::NetworkError
                | GatewayErrorCode::RateLimitExceeded
                | GatewayErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::Timeout => "timeout",
            GatewayErrorCode::NetworkError => "network_error",
            GatewayErrorCode::AuthenticationError => "authentication_error",
            GatewayErrorCode::Declined => "declined",
            GatewayErrorCode::NotFound => "not_found",
            GatewayErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            GatewayErrorCode::UnsupportedCurrency => "unsupported_currency",
            GatewayErrorCode::InvalidResponse => "invalid_response",
            GatewayErrorCode::Rejected => "rejected",
            GatewayErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(GatewayError::from_status(401, "").code, GatewayErrorCode::AuthenticationError);
        assert_eq!(GatewayError::from_status(404, "").code, GatewayErrorCode::NotFound);
        assert_eq!(GatewayError::from_status(422, "").code, GatewayErrorCode::Rejected);
        assert_eq!(GatewayError::from_status(503, "").code, GatewayErrorCode::ProviderError);
        assert!(GatewayError::from_status(503, "").retryable);
        assert!(!GatewayError::from_status(400, "").retryable);
    }

    #[test]
    fn status_message_is_truncated() {
        let err = GatewayError::from_status(500, &"x".repeat(1000));
        assert!(err.message.len() < 220);
    }

    #[test]
    fn transport_timeout_is_retryable() {
        let err: GatewayError = TransportError::Timeout("30s elapsed".into()).into();
        assert_eq!(err.code, GatewayErrorCode::Timeout);
        assert!(err.retryable);
    }

    #[test]
    fn into_billing_keeps_retryable_flag() {
        let billing = GatewayError::timeout("slow").into_billing(GatewayKind::Aps);
        assert!(billing.is_retryable());
        assert_eq!(billing.code(), "GATEWAY_REQUEST_FAILED");

        let billing = GatewayError::declined("no").into_billing(GatewayKind::Aps);
        assert!(!billing.is_retryable());
    }

    #[test]
    fn webhook_request_headers_are_case_insensitive() {
        let req = WebhookRequest::new(b"{}".to_vec(), Timestamp::now())
            .with_header("X-Hyperpay-Signature", "abc");
        assert_eq!(req.header("x-hyperpay-signature"), Some("abc"));
        assert_eq!(req.header("X-HYPERPAY-SIGNATURE"), Some("abc"));
        assert_eq!(req.header("other"), None);
    }
}
