//! HTTP adapters - REST API implementations.

mod app;
pub mod billing;

pub use app::create_app;
pub use billing::{billing_router, BillingAppState};
