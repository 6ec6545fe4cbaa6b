//! Billing Reconciler - multi-gateway payment reconciliation and entitlements.
//!
//! Turns checkout requests, client verification polls and gateway webhooks
//! from three payment gateways into one consistent record of purchases,
//! subscriptions and the content entitlements they grant.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
