//! GatewayRegistry - the configured gateway adapters, by kind.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::billing::{BillingError, GatewayKind};
use crate::ports::PaymentGateway;

/// Lookup table of configured gateways.
///
/// A gateway without credentials is simply absent; asking for it yields
/// `NotConfigured` and leaves the others untouched.
#[derive(Default, Clone)]
pub struct GatewayRegistry {
    gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a gateway under its own kind, replacing any previous entry.
    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.kind(), gateway);
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.register(gateway);
        self
    }

    pub fn get(&self, kind: GatewayKind) -> Result<Arc<dyn PaymentGateway>, BillingError> {
        self.gateways
            .get(&kind)
            .cloned()
            .ok_or(BillingError::NotConfigured(kind))
    }

    pub fn is_configured(&self, kind: GatewayKind) -> bool {
        self.gateways.contains_key(&kind)
    }

    /// Configured kinds in declaration order.
    pub fn configured(&self) -> Vec<GatewayKind> {
        GatewayKind::ALL
            .into_iter()
            .filter(|k| self.is_configured(*k))
            .collect()
    }
}
