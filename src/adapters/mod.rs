//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `gateways` - Payment gateway adapters over an HTTP transport
//! - `memory` - In-memory stores for tests and database-less runs
//! - `postgres` - sqlx-backed stores
//! - `redis` - Webhook dedupe store
//! - `security` - Security signal delivery
//! - `http` - axum routes

pub mod gateways;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod security;

pub use security::TracingSecuritySignalSink;
