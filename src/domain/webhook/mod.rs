//! Webhook domain - normalized gateway events and signature checks.

mod errors;
mod event;
mod signature;

pub use errors::WebhookError;
pub use event::{GatewayEvent, GatewayEventKind};
pub use signature::{
    timestamped_payload, HmacSigner, SignatureHeader, TimestampWindow, MAX_CLOCK_SKEW_SECS,
    MAX_EVENT_AGE_SECS,
};
