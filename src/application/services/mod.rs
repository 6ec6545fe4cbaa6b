//! Application services shared by the billing handlers.
//!
//! - `PurchaseLedger` - guarded purchase transitions
//! - `SubscriptionManager` - activation, cancellation, expiry
//! - `EntitlementResolver` - grant, revoke, resolve
//! - `PaymentReconciler` - completion and refund path shared by webhooks and polling
//! - `CurrencyConverter` - price snapshot at purchase time
//! - `GatewayRegistry` - configured gateway adapters

mod currency_converter;
mod entitlement_resolver;
mod gateway_registry;
mod payment_reconciler;
mod purchase_ledger;
mod subscription_manager;

pub use currency_converter::CurrencyConverter;
pub use entitlement_resolver::EntitlementResolver;
pub use gateway_registry::GatewayRegistry;
pub use payment_reconciler::{PaymentReconciler, ReconcileOutcome};
pub use purchase_ledger::PurchaseLedger;
pub use subscription_manager::SubscriptionManager;
