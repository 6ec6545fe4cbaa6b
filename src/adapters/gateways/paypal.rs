//! PayPal-style gateway adapter.
//!
//! Orders API with OAuth2 client-credentials tokens. An approved order is
//! captured during status lookup, so verification and capture are one step
//! for the caller.
//!
//! # Security
//!
//! - Webhooks carry `Paypal-Signature: t=<unix>,v1=<hex>` where the MAC
//!   covers `"{t}.{body}"`
//! - Timestamps older than 5 minutes (or more than 1 minute ahead) are rejected
//! - Credentials are held as `secrecy::SecretString`

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::billing::{Currency, GatewayKind};
use crate::domain::foundation::{PaymentId, RefundId, Timestamp};
use crate::domain::webhook::{
    timestamped_payload, GatewayEvent, GatewayEventKind, HmacSigner, SignatureHeader, TimestampWindow,
    WebhookError,
};
use crate::ports::{
    CheckoutRequest, CheckoutSession, GatewayError, GatewayErrorCode, HttpAuth, HttpBody, HttpRequest,
    HttpResponse, HttpTransport, PaymentGateway, PaymentLookup, RefundConfirmation, RefundRequest,
    RemotePaymentState, WebhookRequest,
};

use super::common::{
    decimal_money_at, expect_json, gateway_id, order_id_at, parse_webhook_body, payment_id_at, str_at,
    trim_base_url,
};

/// Header carrying the webhook signature.
pub const PAYPAL_SIGNATURE_HEADER: &str = "Paypal-Signature";

const SUPPORTED_CURRENCIES: [Currency; 3] = [Currency::Usd, Currency::Eur, Currency::Gbp];

/// Where the capture id sits in an order response.
const CAPTURE_POINTER: &str = "/purchase_units/0/payments/captures/0";

/// Refresh tokens this long before they expire.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// PayPal API configuration.
#[derive(Clone)]
pub struct PayPalConfig {
    client_id: String,
    client_secret: SecretString,
    webhook_secret: SecretString,
    api_base_url: String,
}

impl PayPalConfig {
    pub fn new(client_id: impl Into<String>, client_secret: SecretString, webhook_secret: SecretString) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            webhook_secret,
            api_base_url: "https://api-m.sandbox.paypal.com".to_string(),
        }
    }

    /// Set a custom API base URL (live endpoint or tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = trim_base_url(url);
        self
    }
}

struct CachedToken {
    value: SecretString,
    expires_at: Timestamp,
}

pub struct PayPalGateway {
    config: PayPalConfig,
    transport: Arc<dyn HttpTransport>,
    signer: HmacSigner,
    window: TimestampWindow,
    token: Mutex<Option<CachedToken>>,
}

impl PayPalGateway {
    pub fn new(config: PayPalConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let signer = HmacSigner::new(config.webhook_secret.clone());
        Self {
            config,
            transport,
            signer,
            window: TimestampWindow::default(),
            token: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// Returns a cached access token, fetching a new one when needed.
    async fn access_token(&self) -> Result<SecretString, GatewayError> {
        let mut cached = self.token.lock().await;
        let now = Timestamp::now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at.is_after(&now) {
                return Ok(token.value.clone());
            }
        }

        let request = HttpRequest::post(
            self.url("/v1/oauth2/token"),
            HttpBody::Form(vec![("grant_type".into(), "client_credentials".into())]),
        )
        .auth(HttpAuth::Basic {
            username: self.config.client_id.clone(),
            password: self.config.client_secret.clone(),
        });

        let body = expect_json(self.transport.send(request).await?).map_err(|e| {
            if e.code == GatewayErrorCode::AuthenticationError {
                tracing::error!(gateway = "paypal", "PayPal rejected client credentials");
            }
            e
        })?;
        let value = str_at(&body, "/access_token")
            .ok_or_else(|| GatewayError::invalid_response("token response missing access_token"))?;
        let expires_in = body.get("expires_in").and_then(Value::as_i64).unwrap_or(0);

        let token = SecretString::new(value.to_string());
        let expires_at = Timestamp::from_unix_secs(now.as_unix_secs() + expires_in - TOKEN_REFRESH_MARGIN_SECS)
            .unwrap_or(now);
        *cached = Some(CachedToken {
            value: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    async fn send_authed(&self, request: HttpRequest) -> Result<HttpResponse, GatewayError> {
        let token = self.access_token().await?;
        Ok(self.transport.send(request.auth(HttpAuth::Bearer(token))).await?)
    }

    async fn get_order(&self, id: &PaymentId) -> Result<Value, GatewayError> {
        let path = format!("/v2/checkout/orders/{}", id);
        expect_json(self.send_authed(HttpRequest::get(self.url(&path))).await?)
    }

    async fn capture_order(&self, id: &PaymentId) -> Result<Value, GatewayError> {
        let path = format!("/v2/checkout/orders/{}/capture", id);
        let request = HttpRequest::post(self.url(&path), HttpBody::Json(json!({})))
            .header("PayPal-Request-Id", format!("capture-{}", id));
        let response = self.send_authed(request).await?;

        // A concurrent capture beat us; the order now holds the result.
        if response.status == 422 && response.text().contains("ORDER_ALREADY_CAPTURED") {
            tracing::debug!(payment_id = %id, "Order already captured, re-reading");
            return self.get_order(id).await;
        }
        expect_json(response)
    }

    fn lookup_from(&self, id: &PaymentId, order: Value) -> PaymentLookup {
        let state = match str_at(&order, "/status") {
            Some("COMPLETED") => {
                let capture_status = str_at(&order, &format!("{}/status", CAPTURE_POINTER));
                match capture_status {
                    None | Some("COMPLETED") => RemotePaymentState::Captured,
                    Some("REFUNDED") | Some("PARTIALLY_REFUNDED") => RemotePaymentState::Refunded,
                    Some(status @ ("DECLINED" | "FAILED")) => RemotePaymentState::Failed {
                        reason: format!("capture {}", status.to_ascii_lowercase()),
                    },
                    Some(_) => RemotePaymentState::Pending,
                }
            }
            Some("VOIDED") => RemotePaymentState::Failed {
                reason: "order voided".to_string(),
            },
            _ => RemotePaymentState::Pending,
        };

        PaymentLookup {
            payment_id: id.clone(),
            order_id: order_id_at(&order, "/purchase_units/0/custom_id"),
            state,
            raw: order,
        }
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::PayPal
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        SUPPORTED_CURRENCIES.contains(&currency)
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let currency = request.amount.currency();
        if !self.supports_currency(currency) {
            return Err(GatewayError::unsupported_currency(self.kind(), currency));
        }

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.order_id.as_str(),
                "custom_id": request.order_id.as_str(),
                "description": request.description(),
                "amount": {
                    "currency_code": currency.code(),
                    "value": request.amount.to_decimal_string(),
                },
            }],
            "application_context": {
                "return_url": request.return_url,
                "cancel_url": request.cancel_url,
                "user_action": "PAY_NOW",
                "shipping_preference": "NO_SHIPPING",
            },
        });
        let http = HttpRequest::post(self.url("/v2/checkout/orders"), HttpBody::Json(body))
            .header("PayPal-Request-Id", request.order_id.as_str());

        let order = expect_json(self.send_authed(http).await?)?;
        let id = str_at(&order, "/id").ok_or_else(|| GatewayError::invalid_response("order id missing"))?;
        let payment_id = gateway_id(id, "order id")?;

        let approve_url = order
            .get("links")
            .and_then(Value::as_array)
            .and_then(|links| {
                links
                    .iter()
                    .find(|l| matches!(l["rel"].as_str(), Some("approve") | Some("payer-action")))
            })
            .and_then(|l| l["href"].as_str())
            .ok_or_else(|| GatewayError::invalid_response("order has no approve link"))?
            .to_string();

        Ok(CheckoutSession {
            payment_id,
            checkout_url: approve_url,
            raw: order,
        })
    }

    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<PaymentLookup, GatewayError> {
        let order = self.get_order(payment_id).await?;
        let order = if str_at(&order, "/status") == Some("APPROVED") {
            self.capture_order(payment_id).await?
        } else {
            order
        };
        Ok(self.lookup_from(payment_id, order))
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundConfirmation, GatewayError> {
        let capture_pointer = format!("{}/id", CAPTURE_POINTER);
        let stored = request
            .gateway_response
            .as_ref()
            .and_then(|r| str_at(r, &capture_pointer))
            .map(str::to_string);
        let capture_id = match stored {
            Some(id) => id,
            None => {
                let order = self.get_order(&request.payment_id).await?;
                str_at(&order, &capture_pointer)
                    .ok_or_else(|| GatewayError::invalid_response("order has no capture to refund"))?
                    .to_string()
            }
        };
        let capture_id = gateway_id(&capture_id, "capture id")?;

        let note: String = request.reason.chars().take(255).collect();
        let body = json!({
            "amount": {
                "currency_code": request.amount.currency().code(),
                "value": request.amount.to_decimal_string(),
            },
            "note_to_payer": note,
        });
        let path = format!("/v2/payments/captures/{}/refund", capture_id);
        let http = HttpRequest::post(self.url(&path), HttpBody::Json(body))
            .header("PayPal-Request-Id", format!("refund-{}", request.order_id));

        let refund = expect_json(self.send_authed(http).await?)?;
        let id = str_at(&refund, "/id").ok_or_else(|| GatewayError::invalid_response("refund id missing"))?;
        let refund_id = RefundId::new(id).map_err(|e| GatewayError::invalid_response(e.to_string()))?;

        Ok(RefundConfirmation { refund_id, raw: refund })
    }

    fn verify_webhook(&self, request: &WebhookRequest) -> Result<GatewayEvent, WebhookError> {
        let header = request
            .header(PAYPAL_SIGNATURE_HEADER)
            .ok_or(WebhookError::MissingSignature)?;
        let header = SignatureHeader::parse(header)?;
        self.window.check(header.timestamp, request.received_at)?;
        self.signer
            .verify(&timestamped_payload(header.timestamp, &request.body), &header.v1_signature)?;

        let body = parse_webhook_body(&request.body)?;
        let event_id = str_at(&body, "/id").ok_or(WebhookError::MissingField("id"))?.to_string();
        let event_type = str_at(&body, "/event_type").ok_or(WebhookError::MissingField("event_type"))?;
        let resource = body.get("resource").cloned().unwrap_or(Value::Null);

        let kind = match event_type {
            "PAYMENT.CAPTURE.COMPLETED" => GatewayEventKind::PaymentCaptured,
            "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => GatewayEventKind::PaymentFailed,
            "PAYMENT.CAPTURE.REFUNDED" => GatewayEventKind::PaymentRefunded,
            other => GatewayEventKind::Unknown(other.to_string()),
        };

        let mut event = GatewayEvent::new(GatewayKind::PayPal, event_id, kind.clone(), Value::Null)
            .with_order_id(order_id_at(&resource, "/custom_id"))
            .with_payment_id(payment_id_at(&resource, "/supplementary_data/related_ids/order_id"));

        match kind {
            GatewayEventKind::PaymentRefunded => {
                event = event.with_refund(
                    str_at(&resource, "/id").map(str::to_string),
                    decimal_money_at(&resource, "/amount/value", "/amount/currency_code"),
                );
            }
            GatewayEventKind::PaymentFailed => {
                let reason = str_at(&resource, "/status_details/reason").unwrap_or("capture denied");
                event = event.with_failure_reason(Some(reason.to_string()));
            }
            _ => {}
        }

        event.payload = body;
        Ok(event)
    }
}
