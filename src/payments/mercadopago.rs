use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::GatewayConfig;
use crate::error::{AppError, Result, msg};
use crate::models::OrderStatus;

use super::{
    CardCharge, CardChargeRequest, CheckoutIntent, CheckoutIntentRequest, Payer, PaymentDetails,
    PaymentGateway,
};

type HmacSha256 = Hmac<Sha256>;

const CURRENCY: &str = "BRL";

/// Map a Mercado Pago payment status onto the order lifecycle.
///
/// `authorized` means funds are reserved but not captured, so it stays pending.
pub fn map_payment_status(status: &str) -> OrderStatus {
    match status {
        "approved" => OrderStatus::Approved,
        "pending" | "in_process" | "in_mediation" | "authorized" => OrderStatus::Pending,
        "rejected" => OrderStatus::Rejected,
        "cancelled" | "refunded" | "charged_back" => OrderStatus::Cancelled,
        other => {
            tracing::warn!("Unknown Mercado Pago status '{}', treating as pending", other);
            OrderStatus::Pending
        }
    }
}

fn cents_to_amount(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Payment ids are numbers in the API but strings everywhere else.
fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

// ============ Request bodies ============

#[derive(Debug, Serialize)]
struct PreferenceRequest<'a> {
    items: Vec<PreferenceItem<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payer: Option<PayerBody<'a>>,
    external_reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
    back_urls: BackUrls<'a>,
    auto_return: &'static str,
}

#[derive(Debug, Serialize)]
struct PreferenceItem<'a> {
    id: &'a str,
    title: &'a str,
    quantity: u32,
    currency_id: &'static str,
    unit_price: f64,
}

#[derive(Debug, Serialize)]
struct BackUrls<'a> {
    success: &'a str,
    pending: &'a str,
    failure: &'a str,
}

#[derive(Debug, Serialize)]
struct PayerBody<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    identification: Option<Identification<'a>>,
}

#[derive(Debug, Serialize)]
struct Identification<'a> {
    #[serde(rename = "type")]
    id_type: &'static str,
    number: &'a str,
}

impl<'a> From<&'a Payer> for PayerBody<'a> {
    fn from(payer: &'a Payer) -> Self {
        Self {
            email: &payer.email,
            first_name: payer.name.as_deref(),
            identification: payer.cpf.as_deref().map(|number| Identification {
                id_type: "CPF",
                number,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct PaymentRequest<'a> {
    transaction_amount: f64,
    token: &'a str,
    description: &'a str,
    installments: u32,
    payment_method_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    issuer_id: Option<&'a str>,
    payer: PayerBody<'a>,
    external_reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
}

// ============ Response bodies ============

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
}

#[derive(Debug, Deserialize)]
pub struct MercadoPagoPayment {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub payer: Option<MercadoPagoPayer>,
}

#[derive(Debug, Deserialize)]
pub struct MercadoPagoPayer {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentSearchResponse {
    #[serde(default)]
    results: Vec<MercadoPagoPayment>,
}

impl From<MercadoPagoPayment> for PaymentDetails {
    fn from(payment: MercadoPagoPayment) -> Self {
        Self {
            status: map_payment_status(&payment.status),
            status_detail: payment.status_detail.unwrap_or(payment.status),
            gateway_reference: payment.id,
            payer_email: payment.payer.and_then(|p| p.email).filter(|e| !e.is_empty()),
            external_reference: payment.external_reference.filter(|r| !r.is_empty()),
        }
    }
}

// ============ Client ============

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    access_token: String,
    api_base: String,
    webhook_secret: Option<String>,
}

impl MercadoPagoClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            access_token: config.access_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "Mercado Pago API error ({}): {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Mercado Pago response: {}", e)))
    }

    fn send_error(e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Gateway("Mercado Pago request timed out".into())
        } else {
            AppError::Gateway(format!("Mercado Pago request failed: {}", e))
        }
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    fn provider_name(&self) -> &'static str {
        "mercadopago"
    }

    async fn create_checkout_intent(&self, request: &CheckoutIntentRequest) -> Result<CheckoutIntent> {
        let body = PreferenceRequest {
            items: request
                .line_items
                .iter()
                .map(|item| PreferenceItem {
                    id: &item.product_id,
                    title: &item.product_title,
                    quantity: 1,
                    currency_id: CURRENCY,
                    unit_price: cents_to_amount(item.unit_price_cents),
                })
                .collect(),
            payer: request.payer.as_ref().map(PayerBody::from),
            external_reference: &request.external_reference,
            notification_url: request.notification_url.as_deref(),
            back_urls: BackUrls {
                success: &request.return_url,
                pending: &request.return_url,
                failure: &request.return_url,
            },
            auto_return: "approved",
        };

        let response = self
            .client
            .post(self.url("/checkout/preferences"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(Self::send_error)?;

        let preference: PreferenceResponse = Self::parse(response).await?;

        Ok(CheckoutIntent {
            gateway_reference: preference.id,
            redirect_url: preference.init_point,
        })
    }

    async fn charge_tokenized_card(&self, request: &CardChargeRequest) -> Result<CardCharge> {
        let body = PaymentRequest {
            transaction_amount: cents_to_amount(request.amount_cents),
            token: &request.card_token,
            description: &request.description,
            installments: request.installments,
            payment_method_id: &request.payment_method_id,
            issuer_id: request.issuer_id.as_deref(),
            payer: PayerBody::from(&request.payer),
            external_reference: &request.external_reference,
            notification_url: request.notification_url.as_deref(),
        };

        // Keyed on our order id: a repeated request for the same order returns
        // the original payment instead of charging again.
        let response = self
            .client
            .post(self.url("/v1/payments"))
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", &request.external_reference)
            .json(&body)
            .send()
            .await
            .map_err(Self::send_error)?;

        let payment: MercadoPagoPayment = Self::parse(response).await?;

        Ok(CardCharge {
            status: map_payment_status(&payment.status),
            status_detail: payment.status_detail.unwrap_or(payment.status),
            gateway_reference: payment.id,
        })
    }

    async fn fetch_payment_by_id(&self, payment_id: &str) -> Result<PaymentDetails> {
        if payment_id.is_empty() || !payment_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::BadRequest(format!("Invalid payment id: {}", payment_id)));
        }

        let response = self
            .client
            .get(self.url(&format!("/v1/payments/{}", payment_id)))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(Self::send_error)?;

        let payment: MercadoPagoPayment = Self::parse(response).await?;
        Ok(payment.into())
    }

    async fn find_payment_by_external_reference(&self, reference: &str) -> Result<Option<PaymentDetails>> {
        let response = self
            .client
            .get(self.url("/v1/payments/search"))
            .bearer_auth(&self.access_token)
            .query(&[
                ("external_reference", reference),
                ("sort", "date_created"),
                ("criteria", "desc"),
            ])
            .send()
            .await
            .map_err(Self::send_error)?;

        let search: PaymentSearchResponse = Self::parse(response).await?;
        Ok(search.results.into_iter().next().map(Into::into))
    }

    /// Verify the `x-signature` header (`ts=...,v1=...`).
    ///
    /// The signed manifest is `id:{data.id};request-id:{x-request-id};ts:{ts};`,
    /// with parts omitted when the value is absent. Without a configured secret
    /// every notification is accepted.
    fn verify_webhook_signature(
        &self,
        data_id: Option<&str>,
        request_id: Option<&str>,
        signature: Option<&str>,
    ) -> Result<bool> {
        let Some(secret) = self.webhook_secret.as_deref() else {
            return Ok(true);
        };
        let Some(signature) = signature else {
            return Ok(false);
        };

        let mut timestamp = None;
        let mut sig_v1 = None;
        for part in signature.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("ts=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        if timestamp.parse::<i64>().is_err() {
            return Err(AppError::BadRequest(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()));
        }

        let mut manifest = String::new();
        if let Some(id) = data_id {
            manifest.push_str(&format!("id:{};", id.to_lowercase()));
        }
        if let Some(rid) = request_id {
            manifest.push_str(&format!("request-id:{};", rid));
        }
        manifest.push_str(&format!("ts:{};", timestamp));

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(manifest.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Length is not secret (always 64 hex chars); the content compare is constant-time.
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}
