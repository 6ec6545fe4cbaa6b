//! HMAC-SHA256 webhook signing primitives.
//!
//! Verification is always real and always constant-time. There is no
//! bypass switch.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::errors::WebhookError;
use crate::domain::foundation::Timestamp;

/// Maximum allowed age for signed webhook timestamps (5 minutes).
pub const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future timestamps (1 minute).
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Computes and checks HMAC-SHA256 signatures with one shared secret.
#[derive(Clone)]
pub struct HmacSigner {
    secret: SecretString,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner").field("secret", &"[REDACTED]").finish()
    }
}

impl HmacSigner {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key");
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }

    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.sign(message))
    }

    /// Constant-time check of raw signature bytes.
    pub fn verify(&self, message: &[u8], provided: &[u8]) -> Result<(), WebhookError> {
        if constant_time_compare(&self.sign(message), provided) {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }

    /// Checks a hex-encoded signature. Case-insensitive.
    pub fn verify_hex(&self, message: &[u8], provided_hex: &str) -> Result<(), WebhookError> {
        let provided_hex = provided_hex.trim();
        if provided_hex.is_empty() {
            return Err(WebhookError::MissingSignature);
        }
        let provided = hex::decode(provided_hex).map_err(|_| WebhookError::InvalidSignature)?;
        self.verify(message, &provided)
    }
}

/// Performs constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Parsed `t=<unix>,v1=<hex>` signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parses a timestamped signature header.
    ///
    /// Format: `t=<timestamp>,v1=<signature>`. Unknown keys are ignored.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let header = header.trim();
        if header.is_empty() {
            return Err(WebhookError::MissingSignature);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid signature header format".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse()
                            .map_err(|_| WebhookError::ParseError("invalid timestamp".to_string()))?,
                    );
                }
                "v1" => {
                    v1_signature = Some(
                        hex::decode(value)
                            .map_err(|_| WebhookError::ParseError("invalid v1 signature hex".to_string()))?,
                    );
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        let v1_signature = v1_signature.ok_or(WebhookError::MissingSignature)?;

        Ok(Self {
            timestamp,
            v1_signature,
        })
    }

    /// Formats a header for the given timestamp and hex signature.
    pub fn format(timestamp: i64, signature_hex: &str) -> String {
        format!("t={},v1={}", timestamp, signature_hex)
    }
}

/// The message signed by timestamped schemes: `"{t}.{body}"`.
pub fn timestamped_payload(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut message = format!("{}.", timestamp).into_bytes();
    message.extend_from_slice(body);
    message
}

/// Replay window for timestamped signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampWindow {
    pub max_age_secs: i64,
    pub max_skew_secs: i64,
}

impl Default for TimestampWindow {
    fn default() -> Self {
        Self {
            max_age_secs: MAX_EVENT_AGE_SECS,
            max_skew_secs: MAX_CLOCK_SKEW_SECS,
        }
    }
}

impl TimestampWindow {
    pub fn check(&self, signed_at: i64, now: Timestamp) -> Result<(), WebhookError> {
        let age = now.as_unix_secs() - signed_at;
        if age > self.max_age_secs {
            return Err(WebhookError::TimestampOutOfRange);
        }
        if age < -self.max_skew_secs {
            return Err(WebhookError::InvalidTimestamp);
        }
        Ok(())
    }
}
