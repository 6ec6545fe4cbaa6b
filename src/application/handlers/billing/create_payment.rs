//! CreatePaymentHandler - starts a checkout with one gateway.

use serde_json::Value;
use std::sync::Arc;

use crate::application::services::{CurrencyConverter, GatewayRegistry, PurchaseLedger};
use crate::domain::billing::{
    BillingAddress, BillingCycle, BillingError, Currency, CustomerInfo, GatewayKind, Money, NewPurchase,
    PlanType, PriceSnapshot,
};
use crate::domain::foundation::{OrderId, PaymentId, Timestamp, UserId};
use crate::ports::CheckoutRequest;

/// Command to start a checkout.
#[derive(Debug, Clone)]
pub struct CreatePaymentCommand {
    pub user_id: UserId,
    pub gateway: GatewayKind,
    pub plan: PlanType,
    pub billing_cycle: BillingCycle,
    pub currency: Currency,
    pub customer: CustomerInfo,
    pub billing_address: Option<BillingAddress>,
    pub return_url: String,
    pub cancel_url: String,
    pub metadata: Option<Value>,
}

/// Result of a started checkout.
#[derive(Debug, Clone)]
pub struct CreatePaymentResult {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub checkout_url: String,
    pub amount: Money,
    pub price_snapshot: PriceSnapshot,
}

/// Handler for starting checkouts.
///
/// The pending purchase is written before the gateway is called, so a
/// failed or timed-out gateway call leaves a `failed` record behind.
pub struct CreatePaymentHandler {
    gateways: Arc<GatewayRegistry>,
    ledger: Arc<PurchaseLedger>,
    converter: Arc<CurrencyConverter>,
}

impl CreatePaymentHandler {
    pub fn new(
        gateways: Arc<GatewayRegistry>,
        ledger: Arc<PurchaseLedger>,
        converter: Arc<CurrencyConverter>,
    ) -> Self {
        Self {
            gateways,
            ledger,
            converter,
        }
    }

    pub async fn handle(&self, cmd: CreatePaymentCommand) -> Result<CreatePaymentResult, BillingError> {
        // 1. Gateway must be configured and settle in the requested currency
        let gateway = self.gateways.get(cmd.gateway)?;
        if !gateway.supports_currency(cmd.currency) {
            return Err(BillingError::validation(
                "currency",
                format!("{} does not accept {}", cmd.gateway, cmd.currency),
            ));
        }

        // 2. Validate the request
        let base = cmd.plan.base_price_usd(cmd.billing_cycle).ok_or_else(|| {
            BillingError::validation("plan", format!("{} is not a purchasable plan", cmd.plan))
        })?;
        validate_redirect("return_url", &cmd.return_url)?;
        validate_redirect("cancel_url", &cmd.cancel_url)?;
        if let Some(address) = &cmd.billing_address {
            address.validate()?;
        }

        // 3. Freeze the price
        let (amount, price_snapshot) = self
            .converter
            .snapshot(base, cmd.currency, Timestamp::now())
            .await?;

        // 4. Record the attempt before talking to the gateway
        let purchase = self
            .ledger
            .create_pending(NewPurchase {
                user_id: cmd.user_id,
                gateway: cmd.gateway,
                plan: cmd.plan,
                billing_cycle: cmd.billing_cycle,
                amount,
                price_snapshot: price_snapshot.clone(),
                customer: cmd.customer.clone(),
                billing_address: cmd.billing_address.clone(),
                metadata: cmd.metadata.unwrap_or(Value::Null),
            })
            .await?;

        // 5. Create the checkout
        let request = CheckoutRequest {
            order_id: purchase.order_id.clone(),
            plan: cmd.plan,
            billing_cycle: cmd.billing_cycle,
            amount,
            customer: cmd.customer,
            billing_address: cmd.billing_address,
            return_url: cmd.return_url,
            cancel_url: cmd.cancel_url,
        };
        let session = match gateway.create_checkout(&request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    order_id = %purchase.order_id,
                    gateway = %cmd.gateway,
                    error = %e,
                    retryable = e.retryable,
                    "Checkout creation failed"
                );
                self.ledger
                    .mark_failed(&purchase.order_id, e.to_string(), None)
                    .await?;
                return Err(e.into_billing(cmd.gateway));
            }
        };

        // 6. Remember the gateway's id for verification and webhooks
        self.ledger
            .attach_payment_id(&purchase.order_id, &session.payment_id, Some(&session.raw))
            .await?;

        tracing::info!(
            order_id = %purchase.order_id,
            payment_id = %session.payment_id,
            gateway = %cmd.gateway,
            "Checkout created"
        );

        Ok(CreatePaymentResult {
            order_id: purchase.order_id,
            payment_id: session.payment_id,
            checkout_url: session.checkout_url,
            amount,
            price_snapshot,
        })
    }
}

fn validate_redirect(field: &str, url: &str) -> Result<(), BillingError> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(BillingError::validation(field, "must be an absolute http(s) URL"))
    }
}
