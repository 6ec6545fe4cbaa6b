//! Helpers shared by the gateway adapters.

use serde_json::Value;

use crate::domain::billing::{Currency, Money};
use crate::domain::foundation::{OrderId, PaymentId};
use crate::domain::webhook::WebhookError;
use crate::ports::{GatewayError, HttpResponse};

/// Turns a transport response into JSON, mapping error statuses.
pub(crate) fn expect_json(response: HttpResponse) -> Result<Value, GatewayError> {
    if !response.is_success() {
        return Err(GatewayError::from_status(response.status, &response.text()));
    }
    response
        .json::<Value>()
        .map_err(|e| GatewayError::invalid_response(format!("invalid JSON: {}", e)))
}

pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Validates an identifier received from a gateway before it is reused in
/// another outbound URL.
pub(crate) fn gateway_id(value: &str, what: &str) -> Result<PaymentId, GatewayError> {
    PaymentId::parse(value)
        .map_err(|e| GatewayError::invalid_response(format!("{} from gateway rejected: {}", what, e)))
}

/// Best-effort order id echo; a malformed value is treated as absent.
pub(crate) fn order_id_at(value: &Value, pointer: &str) -> Option<OrderId> {
    str_at(value, pointer).and_then(|s| OrderId::parse(s).ok())
}

pub(crate) fn payment_id_at(value: &Value, pointer: &str) -> Option<PaymentId> {
    str_at(value, pointer).and_then(|s| PaymentId::parse(s).ok())
}

/// Reads a decimal amount and currency code from two JSON pointers.
pub(crate) fn decimal_money_at(value: &Value, amount: &str, currency: &str) -> Option<Money> {
    let currency: Currency = str_at(value, currency)?.parse().ok()?;
    Money::parse_decimal(currency, str_at(value, amount)?).ok()
}

pub(crate) fn parse_webhook_body(body: &[u8]) -> Result<Value, WebhookError> {
    serde_json::from_slice(body).map_err(|e| WebhookError::ParseError(e.to_string()))
}

pub(crate) fn trim_base_url(url: impl Into<String>) -> String {
    url.into().trim_end_matches('/').to_string()
}
