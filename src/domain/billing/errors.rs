//! Billing error taxonomy.
//!
//! Errors surfaced by checkout, verification and refund operations.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NotConfigured | 503 |
//! | InvalidIdentifierFormat | 400 |
//! | ValidationFailed | 400 |
//! | GatewayRequestFailed | 502 |
//! | SignatureInvalid | 401 (webhooks are still acknowledged with 200) |
//! | PurchaseNotFound | 404 |
//! | IllegalTransition | 409 |
//! | PurchaseNotRefundable | 409 |
//! | ExchangeRateUnavailable | 503 |
//! | Infrastructure | 500 |

use super::currency::Currency;
use super::gateway::GatewayKind;
use super::status::PurchaseStatus;
use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

/// Billing-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Gateway credentials are absent; the gateway is disabled.
    NotConfigured(GatewayKind),

    /// An identifier failed the allow-list check before any outbound call.
    InvalidIdentifierFormat { field: String, reason: String },

    /// Network or HTTP failure talking to the gateway.
    GatewayRequestFailed {
        gateway: GatewayKind,
        reason: String,
        retryable: bool,
    },

    /// Webhook authenticity check failed.
    SignatureInvalid(GatewayKind),

    /// No purchase matches the given order or payment id.
    PurchaseNotFound(String),

    /// The requested move is not permitted from the current status.
    ///
    /// Ledger transitions treat this as a benign no-op; it only reaches a
    /// caller through explicit pre-checks.
    IllegalTransition {
        from: PurchaseStatus,
        to: PurchaseStatus,
    },

    /// Refund requested for a purchase that is not completed.
    PurchaseNotRefundable { order_id: String, status: PurchaseStatus },

    /// No exchange rate is available for the settlement currency.
    ExchangeRateUnavailable(Currency),

    /// Request validation failed.
    ValidationFailed { field: String, message: String },

    /// Storage or other infrastructure failure.
    Infrastructure(String),
}

impl BillingError {
    pub fn not_configured(gateway: GatewayKind) -> Self {
        BillingError::NotConfigured(gateway)
    }

    pub fn invalid_identifier(field: impl Into<String>, reason: impl Into<String>) -> Self {
        BillingError::InvalidIdentifierFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn gateway_failed(gateway: GatewayKind, reason: impl Into<String>, retryable: bool) -> Self {
        BillingError::GatewayRequestFailed {
            gateway,
            reason: reason.into(),
            retryable,
        }
    }

    pub fn purchase_not_found(reference: impl Into<String>) -> Self {
        BillingError::PurchaseNotFound(reference.into())
    }

    pub fn not_refundable(order_id: impl Into<String>, status: PurchaseStatus) -> Self {
        BillingError::PurchaseNotRefundable {
            order_id: order_id.into(),
            status,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::NotConfigured(_) => "GATEWAY_NOT_CONFIGURED",
            BillingError::InvalidIdentifierFormat { .. } => "INVALID_IDENTIFIER_FORMAT",
            BillingError::GatewayRequestFailed { .. } => "GATEWAY_REQUEST_FAILED",
            BillingError::SignatureInvalid(_) => "SIGNATURE_INVALID",
            BillingError::PurchaseNotFound(_) => "PURCHASE_NOT_FOUND",
            BillingError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            BillingError::PurchaseNotRefundable { .. } => "PURCHASE_NOT_REFUNDABLE",
            BillingError::ExchangeRateUnavailable(_) => "EXCHANGE_RATE_UNAVAILABLE",
            BillingError::ValidationFailed { .. } => "VALIDATION_FAILED",
            BillingError::Infrastructure(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns a user-facing error message.
    pub fn message(&self) -> String {
        match self {
            BillingError::NotConfigured(gateway) => {
                format!("Payment gateway '{}' is not configured", gateway)
            }
            BillingError::InvalidIdentifierFormat { field, reason } => {
                format!("Invalid {}: {}", field, reason)
            }
            BillingError::GatewayRequestFailed { gateway, reason, .. } => {
                format!("Payment gateway '{}' request failed: {}", gateway, reason)
            }
            BillingError::SignatureInvalid(gateway) => {
                format!("Invalid webhook signature for gateway '{}'", gateway)
            }
            BillingError::PurchaseNotFound(reference) => {
                format!("Purchase not found: {}", reference)
            }
            BillingError::IllegalTransition { from, to } => {
                format!("Cannot move purchase from {} to {}", from, to)
            }
            BillingError::PurchaseNotRefundable { order_id, status } => {
                format!("Purchase {} is {} and cannot be refunded", order_id, status)
            }
            BillingError::ExchangeRateUnavailable(currency) => {
                format!("No exchange rate available for {}", currency)
            }
            BillingError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            BillingError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            BillingError::GatewayRequestFailed { retryable, .. } => *retryable,
            BillingError::ExchangeRateUnavailable(_) | BillingError::Infrastructure(_) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        match &err {
            ValidationError::InvalidFormat { field, reason }
                if field == "payment_id" || field == "order_id" =>
            {
                BillingError::invalid_identifier(field.clone(), reason.clone())
            }
            ValidationError::EmptyField { field } | ValidationError::OutOfRange { field, .. }
                if field == "payment_id" || field == "order_id" =>
            {
                BillingError::invalid_identifier(field.clone(), err.to_string())
            }
            other => BillingError::validation(other.field().to_string(), other.to_string()),
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::PurchaseNotFound => BillingError::PurchaseNotFound(err.message),
            ErrorCode::ValidationFailed | ErrorCode::InvalidFormat => BillingError::ValidationFailed {
                field: err.details.get("field").cloned().unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            _ => BillingError::Infrastructure(err.to_string()),
        }
    }
}

impl From<BillingError> for DomainError {
    fn from(err: BillingError) -> Self {
        let code = match &err {
            BillingError::NotConfigured(_) => ErrorCode::GatewayNotConfigured,
            BillingError::GatewayRequestFailed { .. } | BillingError::SignatureInvalid(_) => {
                ErrorCode::GatewayError
            }
            BillingError::PurchaseNotFound(_) => ErrorCode::PurchaseNotFound,
            BillingError::IllegalTransition { .. } | BillingError::PurchaseNotRefundable { .. } => {
                ErrorCode::InvalidStateTransition
            }
            BillingError::ExchangeRateUnavailable(_) => ErrorCode::ExchangeRateUnavailable,
            BillingError::InvalidIdentifierFormat { .. } => ErrorCode::InvalidFormat,
            BillingError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            BillingError::Infrastructure(_) => ErrorCode::InternalError,
        };
        DomainError::new(code, err.message())
    }
}
