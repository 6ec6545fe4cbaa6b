//! Mock payment gateway for testing.
//!
//! Configurable `PaymentGateway` for application and integration tests:
//! - Scripted payment states per payment id
//! - Error injection (next call or per method)
//! - Call tracking
//! - Webhook simulation, signed with a real HMAC key
//!
//! Webhooks are always verified. `signed_webhook` produces requests that
//! pass; anything else is rejected exactly like a real adapter would.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{json, Value};

use crate::domain::billing::{Currency, GatewayKind, Money};
use crate::domain::foundation::{OrderId, PaymentId, RefundId, Timestamp};
use crate::domain::webhook::{GatewayEvent, GatewayEventKind, HmacSigner, WebhookError};
use crate::ports::{
    CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, PaymentLookup, RefundConfirmation,
    RefundRequest, RemotePaymentState, WebhookRequest,
};

use super::common::{decimal_money_at, order_id_at, parse_webhook_body, payment_id_at, str_at};

/// Header carrying the hex HMAC of the body.
pub const MOCK_SIGNATURE_HEADER: &str = "X-Mock-Signature";

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

#[derive(Default)]
struct MockState {
    payments: HashMap<PaymentId, (Option<OrderId>, RemotePaymentState)>,
    unsupported: HashSet<Currency>,
    next_error: Option<GatewayError>,
    method_errors: HashMap<String, GatewayError>,
    call_log: Vec<MethodCall>,
    sequence: u32,
}

#[derive(Clone)]
pub struct MockPaymentGateway {
    kind: GatewayKind,
    signer: Arc<HmacSigner>,
    inner: Arc<Mutex<MockState>>,
}

impl MockPaymentGateway {
    pub fn new(kind: GatewayKind, webhook_secret: SecretString) -> Self {
        Self {
            kind,
            signer: Arc::new(HmacSigner::new(webhook_secret)),
            inner: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration
    // ════════════════════════════════════════════════════════════════════════════

    /// Sets what `fetch_payment` reports for `payment_id`.
    pub fn set_payment_state(&self, payment_id: &PaymentId, order_id: Option<OrderId>, state: RemotePaymentState) {
        self.state().payments.insert(payment_id.clone(), (order_id, state));
    }

    pub fn reject_currency(&self, currency: Currency) {
        self.state().unsupported.insert(currency);
    }

    /// Fails the next call to any method.
    pub fn set_error(&self, error: GatewayError) {
        self.state().next_error = Some(error);
    }

    /// Fails every call to `method` until cleared.
    pub fn set_method_error(&self, method: &str, error: GatewayError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state().call_log.iter().filter(|c| c.method == method).count()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhook Simulation
    // ════════════════════════════════════════════════════════════════════════════

    /// Builds a correctly signed webhook request for `body`.
    pub fn signed_webhook(&self, body: &Value) -> WebhookRequest {
        let raw = body.to_string();
        let signature = self.signer.sign_hex(raw.as_bytes());
        WebhookRequest::new(raw.into_bytes(), Timestamp::now()).with_header(MOCK_SIGNATURE_HEADER, signature)
    }

    /// Body of a capture notification for `order_id`.
    pub fn captured_event(event_id: &str, order_id: &OrderId) -> Value {
        json!({"id": event_id, "type": "payment.captured", "order_id": order_id.as_str()})
    }

    pub fn failed_event(event_id: &str, order_id: &OrderId, reason: &str) -> Value {
        json!({"id": event_id, "type": "payment.failed", "order_id": order_id.as_str(), "reason": reason})
    }

    pub fn refunded_event(event_id: &str, order_id: &OrderId, refund_id: &str, amount: &Money) -> Value {
        json!({
            "id": event_id,
            "type": "payment.refunded",
            "order_id": order_id.as_str(),
            "refund_id": refund_id,
            "amount": amount.to_decimal_string(),
            "currency": amount.currency().code(),
        })
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), GatewayError> {
        let mut state = self.state();
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        Ok(())
    }

    fn next_sequence(&self) -> u32 {
        let mut state = self.state();
        state.sequence += 1;
        state.sequence
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn kind(&self) -> GatewayKind {
        self.kind
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        !self.state().unsupported.contains(&currency)
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        self.record_call(
            "create_checkout",
            vec![request.order_id.to_string(), request.amount.to_string()],
        );
        self.check_error("create_checkout")?;
        if !self.supports_currency(request.amount.currency()) {
            return Err(GatewayError::unsupported_currency(self.kind, request.amount.currency()));
        }

        let payment_id = PaymentId::parse(format!("mock_pay_{}", self.next_sequence()))
            .map_err(|e| GatewayError::invalid_response(e.to_string()))?;
        self.set_payment_state(&payment_id, Some(request.order_id.clone()), RemotePaymentState::Pending);

        Ok(CheckoutSession {
            checkout_url: format!("https://mock.gateway.test/checkout/{}", payment_id),
            raw: json!({"id": payment_id.as_str(), "order_id": request.order_id.as_str()}),
            payment_id,
        })
    }

    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<PaymentLookup, GatewayError> {
        self.record_call("fetch_payment", vec![payment_id.to_string()]);
        self.check_error("fetch_payment")?;

        let (order_id, state) = self
            .state()
            .payments
            .get(payment_id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found("payment"))?;

        Ok(PaymentLookup {
            payment_id: payment_id.clone(),
            raw: json!({"id": payment_id.as_str(), "state": format!("{:?}", state)}),
            order_id,
            state,
        })
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundConfirmation, GatewayError> {
        self.record_call(
            "refund",
            vec![request.payment_id.to_string(), request.amount.to_string()],
        );
        self.check_error("refund")?;

        let refund_id = RefundId::new(format!("mock_ref_{}", self.next_sequence()))
            .map_err(|e| GatewayError::invalid_response(e.to_string()))?;
        Ok(RefundConfirmation {
            raw: json!({"id": refund_id.as_str()}),
            refund_id,
        })
    }

    fn verify_webhook(&self, request: &WebhookRequest) -> Result<GatewayEvent, WebhookError> {
        let signature = request
            .header(MOCK_SIGNATURE_HEADER)
            .ok_or(WebhookError::MissingSignature)?;
        self.signer.verify_hex(&request.body, signature)?;

        let body = parse_webhook_body(&request.body)?;
        let event_id = str_at(&body, "/id").ok_or(WebhookError::MissingField("id"))?.to_string();
        let kind = GatewayEventKind::parse(str_at(&body, "/type").ok_or(WebhookError::MissingField("type"))?);

        let mut event = GatewayEvent::new(self.kind, event_id, kind, Value::Null)
            .with_order_id(order_id_at(&body, "/order_id"))
            .with_payment_id(payment_id_at(&body, "/payment_id"))
            .with_failure_reason(str_at(&body, "/reason").map(str::to_string));
        if let Some(refund_id) = str_at(&body, "/refund_id") {
            event = event.with_refund(
                Some(refund_id.to_string()),
                decimal_money_at(&body, "/amount", "/currency"),
            );
        }
        event.payload = body;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::GatewayErrorCode;

    fn mock() -> MockPaymentGateway {
        MockPaymentGateway::new(GatewayKind::HyperPay, SecretString::new("mock-secret".into()))
    }

    #[tokio::test]
    async fn injected_error_is_consumed_once() {
        let gw = mock();
        gw.set_error(GatewayError::timeout("slow"));
        let id = PaymentId::parse("p1").unwrap();
        gw.set_payment_state(&id, None, RemotePaymentState::Captured);

        assert_eq!(gw.fetch_payment(&id).await.unwrap_err().code, GatewayErrorCode::Timeout);
        assert_eq!(gw.fetch_payment(&id).await.unwrap().state, RemotePaymentState::Captured);
        assert_eq!(gw.call_count("fetch_payment"), 2);
    }

    #[test]
    fn signed_webhook_round_trips() {
        let gw = mock();
        let order = OrderId::parse("ord_m1").unwrap();
        let event = gw
            .verify_webhook(&gw.signed_webhook(&MockPaymentGateway::captured_event("e1", &order)))
            .unwrap();
        assert_eq!(event.kind, GatewayEventKind::PaymentCaptured);
        assert_eq!(event.order_id, Some(order));
    }

    #[test]
    fn webhook_signed_with_other_key_is_rejected() {
        let gw = mock();
        let other = MockPaymentGateway::new(GatewayKind::HyperPay, SecretString::new("other".into()));
        let order = OrderId::parse("ord_m1").unwrap();
        let request = other.signed_webhook(&MockPaymentGateway::captured_event("e1", &order));
        assert_eq!(gw.verify_webhook(&request).unwrap_err(), WebhookError::InvalidSignature);
    }
}
