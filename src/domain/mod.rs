//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `billing` - Purchases, prices, currency snapshots and gateways
//! - `subscription` - Subscription lifecycle and billing periods
//! - `entitlement` - Plan-scoped capability tokens
//! - `webhook` - Normalized gateway events and signature verification

pub mod billing;
pub mod entitlement;
pub mod foundation;
pub mod subscription;
pub mod webhook;
