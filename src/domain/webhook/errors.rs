//! Webhook error types.
//!
//! Every variant is acknowledged to the gateway with HTTP 200; the variant
//! only decides what gets logged, recorded, or signalled.

use thiserror::Error;

use crate::domain::foundation::DomainError;

/// Errors that occur during webhook authentication and processing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// Signature present but does not match.
    #[error("Invalid signature")]
    InvalidSignature,

    /// No signature header or field.
    #[error("Missing signature")]
    MissingSignature,

    /// Signed timestamp older than the replay window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signed timestamp too far in the future.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required field missing from the payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// No purchase matches the event's references.
    #[error("Purchase not found: {0}")]
    PurchaseNotFound(String),

    /// Event was intentionally ignored (not an error condition).
    #[error("Event ignored: {0}")]
    Ignored(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Dedupe store operation failed (Redis/cache).
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl WebhookError {
    /// True for failures of the authenticity check itself.
    ///
    /// These never touch ledger state and raise a security signal.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::InvalidSignature
                | WebhookError::MissingSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::InvalidTimestamp
        )
    }

    /// Returns true if replaying the same event could succeed.
    ///
    /// Retryable failures are not recorded in the dedupe store.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Database(_) | WebhookError::StorageError(_))
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        WebhookError::Database(err.to_string())
    }
}
