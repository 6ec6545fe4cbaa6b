//! Amazon Payment Services (PayFort) gateway adapter.
//!
//! Every call goes to a single JSON endpoint and is signed; every response
//! and notification is signed back with a separate secret.
//!
//! The merchant reference is our order id, so the payment id stays the
//! order-id placeholder for the life of the purchase. The `fort_id` assigned
//! by the gateway is kept in the stored gateway response.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::domain::billing::{Currency, GatewayKind, Money};
use crate::domain::foundation::{PaymentId, RefundId};
use crate::domain::webhook::{GatewayEvent, GatewayEventKind, HmacSigner, WebhookError};
use crate::ports::{
    CheckoutRequest, CheckoutSession, GatewayError, HttpBody, HttpRequest, HttpTransport, PaymentGateway,
    PaymentLookup, RefundConfirmation, RefundRequest, RemotePaymentState, WebhookRequest,
};

use super::common::{expect_json, order_id_at, parse_webhook_body, str_at, trim_base_url};

const SUPPORTED_CURRENCIES: [Currency; 5] = [
    Currency::Sar,
    Currency::Aed,
    Currency::Egp,
    Currency::Kwd,
    Currency::Usd,
];

const API_PATH: &str = "/FortAPI/paymentApi";

const PAYMENT_LINK_CREATED: &str = "48000";
const REFUND_SUCCESS: &str = "06000";
/// Prefix of every successful CHECK_STATUS response code.
const CHECK_STATUS_OK_PREFIX: &str = "12";

/// APS API configuration.
#[derive(Clone)]
pub struct ApsConfig {
    merchant_identifier: String,
    access_code: SecretString,
    request_secret: SecretString,
    response_secret: SecretString,
    language: String,
    api_base_url: String,
}

impl ApsConfig {
    pub fn new(
        merchant_identifier: impl Into<String>,
        access_code: SecretString,
        request_secret: SecretString,
        response_secret: SecretString,
    ) -> Self {
        Self {
            merchant_identifier: merchant_identifier.into(),
            access_code,
            request_secret,
            response_secret,
            language: "en".to_string(),
            api_base_url: "https://sbpaymentservices.payfort.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = trim_base_url(url);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Concatenates `key=value` pairs sorted by key, skipping the signature
/// itself and null values.
pub fn signing_string(params: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = params
        .keys()
        .filter(|k| k.as_str() != "signature" && !params[k.as_str()].is_null())
        .collect();
    keys.sort();

    keys.into_iter()
        .map(|k| match &params[k.as_str()] {
            Value::String(s) => format!("{}={}", k, s),
            other => format!("{}={}", k, other),
        })
        .collect()
}

/// Adds a `signature` field computed over the other fields.
pub fn sign_params(signer: &HmacSigner, params: &mut Map<String, Value>) {
    let signature = signer.sign_hex(signing_string(params).as_bytes());
    params.insert("signature".to_string(), Value::String(signature));
}

fn verify_params(signer: &HmacSigner, params: &Map<String, Value>) -> Result<(), WebhookError> {
    let provided = params
        .get("signature")
        .and_then(Value::as_str)
        .ok_or(WebhookError::MissingSignature)?;
    signer.verify_hex(signing_string(params).as_bytes(), provided)
}

pub struct ApsGateway {
    config: ApsConfig,
    transport: Arc<dyn HttpTransport>,
    request_signer: HmacSigner,
    response_signer: HmacSigner,
}

impl ApsGateway {
    pub fn new(config: ApsConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let request_signer = HmacSigner::new(config.request_secret.clone());
        let response_signer = HmacSigner::new(config.response_secret.clone());
        Self {
            config,
            transport,
            request_signer,
            response_signer,
        }
    }

    fn base_params(&self, merchant_reference: &str) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert(
            "access_code".into(),
            Value::String(self.config.access_code.expose_secret().clone()),
        );
        params.insert(
            "merchant_identifier".into(),
            Value::String(self.config.merchant_identifier.clone()),
        );
        params.insert("merchant_reference".into(), Value::String(merchant_reference.to_string()));
        params.insert("language".into(), Value::String(self.config.language.clone()));
        params
    }

    /// Signs, sends, and checks the response signature.
    async fn call(&self, mut params: Map<String, Value>) -> Result<Value, GatewayError> {
        sign_params(&self.request_signer, &mut params);
        let url = format!("{}{}", self.config.api_base_url, API_PATH);
        let request = HttpRequest::post(url, HttpBody::Json(Value::Object(params)));

        let body = expect_json(self.transport.send(request).await?)?;
        let object = body
            .as_object()
            .ok_or_else(|| GatewayError::invalid_response("expected a JSON object"))?;
        verify_params(&self.response_signer, object).map_err(|e| {
            tracing::warn!(gateway = "aps", error = %e, "Response signature check failed");
            GatewayError::invalid_response("response signature mismatch")
        })?;
        Ok(body)
    }

    fn response_code(body: &Value) -> &str {
        str_at(body, "/response_code").unwrap_or_default()
    }

    fn response_message(body: &Value) -> String {
        str_at(body, "/response_message").unwrap_or("no message").to_string()
    }

    fn amount_value(money: &Money) -> Value {
        json!(money.minor_units())
    }

    /// Reads an amount that may be sent as a number or a numeric string.
    fn minor_amount(value: &Value, currency: Currency) -> Option<Money> {
        let minor = match value.get("amount")? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.parse().ok()?,
            _ => return None,
        };
        Money::from_minor(currency, minor).ok()
    }
}

#[async_trait]
impl PaymentGateway for ApsGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Aps
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        SUPPORTED_CURRENCIES.contains(&currency)
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let currency = request.amount.currency();
        if !self.supports_currency(currency) {
            return Err(GatewayError::unsupported_currency(self.kind(), currency));
        }

        let mut params = self.base_params(request.order_id.as_str());
        params.insert("service_command".into(), json!("PAYMENT_LINK"));
        params.insert("amount".into(), Self::amount_value(&request.amount));
        params.insert("currency".into(), json!(currency.code()));
        params.insert("customer_email".into(), json!(request.customer.email));
        params.insert("order_description".into(), json!(request.description()));
        params.insert("return_url".into(), json!(request.return_url));
        if let Some(name) = &request.customer.name {
            params.insert("customer_name".into(), json!(name));
        }

        let body = self.call(params).await?;
        if Self::response_code(&body) != PAYMENT_LINK_CREATED {
            let code = Self::response_code(&body).to_string();
            return Err(GatewayError::declined(Self::response_message(&body)).with_provider_code(code));
        }

        let checkout_url = str_at(&body, "/payment_link")
            .ok_or_else(|| GatewayError::invalid_response("payment link missing"))?
            .to_string();

        Ok(CheckoutSession {
            payment_id: PaymentId::placeholder_for(&request.order_id),
            checkout_url,
            raw: body,
        })
    }

    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<PaymentLookup, GatewayError> {
        let mut params = self.base_params(payment_id.as_str());
        params.insert("query_command".into(), json!("CHECK_STATUS"));

        let body = self.call(params).await?;
        let code = Self::response_code(&body);
        if !code.starts_with(CHECK_STATUS_OK_PREFIX) {
            return Err(GatewayError::declined(Self::response_message(&body)).with_provider_code(code));
        }

        let state = match str_at(&body, "/transaction_status") {
            Some("14") => RemotePaymentState::Captured,
            Some("06") => RemotePaymentState::Refunded,
            Some("13") | Some("00") => RemotePaymentState::Failed {
                reason: str_at(&body, "/transaction_message")
                    .unwrap_or("transaction failed")
                    .to_string(),
            },
            _ => RemotePaymentState::Pending,
        };

        Ok(PaymentLookup {
            payment_id: payment_id.clone(),
            order_id: order_id_at(&body, "/merchant_reference"),
            state,
            raw: body,
        })
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundConfirmation, GatewayError> {
        let mut params = self.base_params(request.order_id.as_str());
        params.insert("command".into(), json!("REFUND"));
        params.insert("amount".into(), Self::amount_value(&request.amount));
        params.insert("currency".into(), json!(request.amount.currency().code()));
        params.insert("order_description".into(), json!(request.reason));
        if let Some(fort_id) = request.gateway_response.as_ref().and_then(|r| str_at(r, "/fort_id")) {
            params.insert("fort_id".into(), json!(fort_id));
        }

        let body = self.call(params).await?;
        if Self::response_code(&body) != REFUND_SUCCESS {
            let code = Self::response_code(&body).to_string();
            return Err(GatewayError::declined(Self::response_message(&body)).with_provider_code(code));
        }

        let fort_id = str_at(&body, "/fort_id").ok_or_else(|| GatewayError::invalid_response("fort_id missing"))?;
        let refund_id = RefundId::new(fort_id).map_err(|e| GatewayError::invalid_response(e.to_string()))?;
        Ok(RefundConfirmation { refund_id, raw: body })
    }

    fn verify_webhook(&self, request: &WebhookRequest) -> Result<GatewayEvent, WebhookError> {
        let body = parse_webhook_body(&request.body)?;
        let params = body
            .as_object()
            .ok_or_else(|| WebhookError::ParseError("expected a JSON object".into()))?;
        verify_params(&self.response_signer, params)?;

        let command = str_at(&body, "/command").ok_or(WebhookError::MissingField("command"))?;
        let status = str_at(&body, "/status").ok_or(WebhookError::MissingField("status"))?;
        let fort_id = str_at(&body, "/fort_id").ok_or(WebhookError::MissingField("fort_id"))?;

        let kind = match (command, status) {
            ("PURCHASE", "14") => GatewayEventKind::PaymentCaptured,
            ("PURCHASE", "13") => GatewayEventKind::PaymentFailed,
            ("REFUND", "06") => GatewayEventKind::PaymentRefunded,
            (command, status) => GatewayEventKind::Unknown(format!("{}:{}", command, status)),
        };

        // One fort id carries both the purchase and its refund notifications.
        let event_id = format!("{}:{}:{}", command, fort_id, status);
        let order_id = order_id_at(&body, "/merchant_reference");
        let payment_id = order_id.as_ref().map(PaymentId::placeholder_for);

        let mut event = GatewayEvent::new(GatewayKind::Aps, event_id, kind.clone(), Value::Null)
            .with_order_id(order_id)
            .with_payment_id(payment_id);

        match kind {
            GatewayEventKind::PaymentFailed => {
                event = event.with_failure_reason(Some(Self::response_message(&body)));
            }
            GatewayEventKind::PaymentRefunded => {
                let amount = str_at(&body, "/currency")
                    .and_then(|c| c.parse::<Currency>().ok())
                    .and_then(|c| Self::minor_amount(&body, c));
                event = event.with_refund(Some(fort_id.to_string()), amount);
            }
            _ => {}
        }

        event.payload = body;
        Ok(event)
    }
}
