mod mercadopago;

pub use mercadopago::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{LineItem, OrderStatus};

/// Buyer details forwarded to the processor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payer {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Brazilian taxpayer id, digits only.
    #[serde(default)]
    pub cpf: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutIntentRequest {
    /// Our order id; comes back on every payment created from this checkout.
    pub external_reference: String,
    pub line_items: Vec<LineItem>,
    pub payer: Option<Payer>,
    pub notification_url: Option<String>,
    pub return_url: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutIntent {
    pub gateway_reference: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone)]
pub struct CardChargeRequest {
    pub external_reference: String,
    pub amount_cents: i64,
    pub description: String,
    pub card_token: String,
    pub payment_method_id: String,
    pub installments: u32,
    pub issuer_id: Option<String>,
    pub payer: Payer,
    pub notification_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CardCharge {
    pub gateway_reference: String,
    pub status: OrderStatus,
    pub status_detail: String,
}

/// Canonical payment state as reported by the processor's API.
#[derive(Debug, Clone)]
pub struct PaymentDetails {
    pub gateway_reference: String,
    pub status: OrderStatus,
    pub status_detail: String,
    pub payer_email: Option<String>,
    pub external_reference: Option<String>,
}

/// Payment processor operations used by the storefront.
///
/// Implementations map processor statuses into [`OrderStatus`] before
/// returning, apply a bounded timeout to every call, and never retry: a
/// retried charge can be a double charge.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Processor name for logging (e.g., "mercadopago").
    fn provider_name(&self) -> &'static str;

    /// Create a hosted checkout the customer is redirected to.
    async fn create_checkout_intent(&self, request: &CheckoutIntentRequest) -> Result<CheckoutIntent>;

    /// Charge a card tokenized on the client.
    async fn charge_tokenized_card(&self, request: &CardChargeRequest) -> Result<CardCharge>;

    /// Fetch the authoritative state of a payment.
    async fn fetch_payment_by_id(&self, payment_id: &str) -> Result<PaymentDetails>;

    /// Most recent payment created for an external reference, if any.
    async fn find_payment_by_external_reference(&self, reference: &str) -> Result<Option<PaymentDetails>>;

    /// Verify a webhook signature. Gateways without signing accept everything.
    fn verify_webhook_signature(
        &self,
        _data_id: Option<&str>,
        _request_id: Option<&str>,
        _signature: Option<&str>,
    ) -> Result<bool> {
        Ok(true)
    }
}
