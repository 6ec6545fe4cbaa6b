//! Payment gateway adapters.
//!
//! Each adapter implements `PaymentGateway` over an injected `HttpTransport`:
//! - `ReqwestTransport` in production
//! - `ScriptedTransport` in tests

mod aps;
mod common;
mod hyperpay;
mod mock;
mod paypal;
mod scripted;
mod transport;

pub use aps::{sign_params as sign_aps_params, signing_string as aps_signing_string, ApsConfig, ApsGateway};
pub use hyperpay::{classify_result_code, HyperPayConfig, HyperPayGateway, ResultClass, HYPERPAY_SIGNATURE_HEADER};
pub use mock::{MethodCall, MockPaymentGateway, MOCK_SIGNATURE_HEADER};
pub use paypal::{PayPalConfig, PayPalGateway, PAYPAL_SIGNATURE_HEADER};
pub use scripted::ScriptedTransport;
pub use transport::{ReqwestTransport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
