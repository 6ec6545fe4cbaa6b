//! HyperPay (OPPWA) gateway adapter.
//!
//! Copy-and-pay checkouts: the session id doubles as the payment id until the
//! widget completes, and result codes carry the outcome.

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use std::sync::Arc;

use crate::domain::billing::{Currency, GatewayKind, Money};
use crate::domain::foundation::{PaymentId, RefundId};
use crate::domain::webhook::{GatewayEvent, GatewayEventKind, HmacSigner, WebhookError};
use crate::ports::{
    CheckoutRequest, CheckoutSession, GatewayError, HttpAuth, HttpBody, HttpRequest, HttpTransport,
    PaymentGateway, PaymentLookup, RefundConfirmation, RefundRequest, RemotePaymentState, WebhookRequest,
};

use super::common::{expect_json, gateway_id, order_id_at, parse_webhook_body, str_at, trim_base_url};

/// Header carrying the hex HMAC of the notification body.
pub const HYPERPAY_SIGNATURE_HEADER: &str = "X-Hyperpay-Signature";

const SUPPORTED_CURRENCIES: [Currency; 3] = [Currency::Sar, Currency::Aed, Currency::Usd];

/// HyperPay API configuration.
#[derive(Clone)]
pub struct HyperPayConfig {
    access_token: SecretString,
    entity_id: String,
    webhook_secret: SecretString,
    api_base_url: String,
}

impl HyperPayConfig {
    pub fn new(access_token: SecretString, entity_id: impl Into<String>, webhook_secret: SecretString) -> Self {
        Self {
            access_token,
            entity_id: entity_id.into(),
            webhook_secret,
            api_base_url: "https://eu-test.oppwa.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = trim_base_url(url);
        self
    }
}

/// Outcome class of a HyperPay result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    Success,
    Pending,
    Rejected,
}

/// Classifies an OPPWA result code.
///
/// Manual-review codes count as pending: money has not moved yet.
pub fn classify_result_code(code: &str) -> ResultClass {
    const SUCCESS: [&str; 6] = ["000.000.", "000.100.1", "000.3", "000.6", "000.400.110", "000.400.120"];
    const REVIEW: [&str; 2] = ["000.400.0", "000.400.100"];
    const PENDING: [&str; 3] = ["000.200", "800.400.5", "100.400.500"];

    if SUCCESS.iter().any(|p| code.starts_with(p)) {
        ResultClass::Success
    } else if REVIEW.iter().chain(PENDING.iter()).any(|p| code.starts_with(p)) {
        ResultClass::Pending
    } else {
        ResultClass::Rejected
    }
}

pub struct HyperPayGateway {
    config: HyperPayConfig,
    transport: Arc<dyn HttpTransport>,
    signer: HmacSigner,
}

impl HyperPayGateway {
    pub fn new(config: HyperPayConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let signer = HmacSigner::new(config.webhook_secret.clone());
        Self {
            config,
            transport,
            signer,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    fn auth(&self) -> HttpAuth {
        HttpAuth::Bearer(self.config.access_token.clone())
    }

    fn field(name: &str, value: impl Into<String>) -> (String, String) {
        (name.to_string(), value.into())
    }

    fn result_of(body: &Value) -> (String, String) {
        let code = str_at(body, "/result/code").unwrap_or_default().to_string();
        let description = str_at(body, "/result/description")
            .unwrap_or("no description")
            .to_string();
        (code, description)
    }
}

#[async_trait]
impl PaymentGateway for HyperPayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::HyperPay
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        SUPPORTED_CURRENCIES.contains(&currency)
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let currency = request.amount.currency();
        if !self.supports_currency(currency) {
            return Err(GatewayError::unsupported_currency(self.kind(), currency));
        }

        let mut fields = vec![
            Self::field("entityId", self.config.entity_id.as_str()),
            Self::field("amount", request.amount.to_decimal_string()),
            Self::field("currency", currency.code()),
            Self::field("paymentType", "DB"),
            Self::field("merchantTransactionId", request.order_id.as_str()),
            Self::field("customer.email", request.customer.email.as_str()),
        ];
        if let Some(name) = &request.customer.name {
            fields.push(Self::field("customer.givenName", name.as_str()));
        }
        if let Some(address) = &request.billing_address {
            fields.push(Self::field("billing.street1", address.line1.as_str()));
            fields.push(Self::field("billing.city", address.city.as_str()));
            fields.push(Self::field("billing.country", address.country.as_str()));
            if let Some(state) = &address.state {
                fields.push(Self::field("billing.state", state.as_str()));
            }
            if let Some(postcode) = &address.postal_code {
                fields.push(Self::field("billing.postcode", postcode.as_str()));
            }
        }

        let http = HttpRequest::post(self.url("/v1/checkouts"), HttpBody::Form(fields)).auth(self.auth());
        let body = expect_json(self.transport.send(http).await?)?;

        let (code, description) = Self::result_of(&body);
        if classify_result_code(&code) == ResultClass::Rejected {
            return Err(GatewayError::declined(description).with_provider_code(code));
        }

        let id = str_at(&body, "/id").ok_or_else(|| GatewayError::invalid_response("checkout id missing"))?;
        let payment_id = gateway_id(id, "checkout id")?;
        let checkout_url = format!("{}/v1/paymentWidgets.js?checkoutId={}", self.config.api_base_url, payment_id);

        Ok(CheckoutSession {
            payment_id,
            checkout_url,
            raw: body,
        })
    }

    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<PaymentLookup, GatewayError> {
        let path = format!(
            "/v1/checkouts/{}/payment?entityId={}",
            payment_id, self.config.entity_id
        );
        let http = HttpRequest::get(self.url(&path)).auth(self.auth());
        let body = expect_json(self.transport.send(http).await?)?;

        let (code, description) = Self::result_of(&body);
        let state = match classify_result_code(&code) {
            ResultClass::Success => RemotePaymentState::Captured,
            ResultClass::Pending => RemotePaymentState::Pending,
            ResultClass::Rejected => RemotePaymentState::Failed { reason: description },
        };

        Ok(PaymentLookup {
            payment_id: payment_id.clone(),
            order_id: order_id_at(&body, "/merchantTransactionId"),
            state,
            raw: body,
        })
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundConfirmation, GatewayError> {
        // The settled payment id differs from the checkout id when known.
        let target = match request.gateway_response.as_ref().and_then(|r| str_at(r, "/id")) {
            Some(id) => gateway_id(id, "payment id")?,
            None => request.payment_id.clone(),
        };

        let fields = vec![
            Self::field("entityId", self.config.entity_id.as_str()),
            Self::field("amount", request.amount.to_decimal_string()),
            Self::field("currency", request.amount.currency().code()),
            Self::field("paymentType", "RF"),
        ];
        let path = format!("/v1/payments/{}", target);
        let http = HttpRequest::post(self.url(&path), HttpBody::Form(fields)).auth(self.auth());
        let body = expect_json(self.transport.send(http).await?)?;

        let (code, description) = Self::result_of(&body);
        if classify_result_code(&code) != ResultClass::Success {
            return Err(GatewayError::declined(format!("refund rejected: {}", description)).with_provider_code(code));
        }

        let id = str_at(&body, "/id").ok_or_else(|| GatewayError::invalid_response("refund id missing"))?;
        let refund_id = RefundId::new(id).map_err(|e| GatewayError::invalid_response(e.to_string()))?;
        Ok(RefundConfirmation { refund_id, raw: body })
    }

    fn verify_webhook(&self, request: &WebhookRequest) -> Result<GatewayEvent, WebhookError> {
        let signature = request
            .header(HYPERPAY_SIGNATURE_HEADER)
            .ok_or(WebhookError::MissingSignature)?;
        self.signer.verify_hex(&request.body, signature)?;

        let body = parse_webhook_body(&request.body)?;
        let notification_type = str_at(&body, "/type").ok_or(WebhookError::MissingField("type"))?;
        let payload = body.get("payload").cloned().unwrap_or(Value::Null);
        let event_id = str_at(&payload, "/id")
            .ok_or(WebhookError::MissingField("payload.id"))?
            .to_string();

        if notification_type != "PAYMENT" {
            let mut event = GatewayEvent::new(
                GatewayKind::HyperPay,
                event_id,
                GatewayEventKind::Unknown(notification_type.to_string()),
                Value::Null,
            );
            event.payload = body;
            return Ok(event);
        }

        let (code, description) = Self::result_of(&payload);
        let payment_type = str_at(&payload, "/paymentType").unwrap_or("DB");
        let kind = match (payment_type, classify_result_code(&code)) {
            ("DB", ResultClass::Success) => GatewayEventKind::PaymentCaptured,
            ("DB", ResultClass::Rejected) => GatewayEventKind::PaymentFailed,
            ("RF", ResultClass::Success) => GatewayEventKind::PaymentRefunded,
            (other, class) => GatewayEventKind::Unknown(format!("{}:{:?}", other, class).to_ascii_lowercase()),
        };

        let payment_id = str_at(&payload, "/ndc")
            .or_else(|| str_at(&payload, "/id"))
            .and_then(|s| PaymentId::parse(s).ok());

        let mut event = GatewayEvent::new(GatewayKind::HyperPay, event_id.clone(), kind.clone(), Value::Null)
            .with_order_id(order_id_at(&payload, "/merchantTransactionId"))
            .with_payment_id(payment_id);

        match kind {
            GatewayEventKind::PaymentFailed => {
                event = event.with_failure_reason(Some(description));
            }
            GatewayEventKind::PaymentRefunded => {
                let amount = str_at(&payload, "/currency")
                    .and_then(|c| c.parse::<Currency>().ok())
                    .and_then(|c| Money::parse_decimal(c, str_at(&payload, "/amount")?).ok());
                event = event.with_refund(Some(event_id), amount);
            }
            _ => {}
        }

        event.payload = body;
        Ok(event)
    }
}
