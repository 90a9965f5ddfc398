use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::checkout::{self, CardDetails, OrderOutcome, OrderRequest, PaymentFlow};
use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::middleware::OptionalSession;
use crate::models::OrderStatus;
use crate::payments::Payer;

/// Redirect checkout. Prices come from the catalog; amounts sent by the
/// client are not part of the request and are ignored.
#[derive(Debug, Deserialize)]
pub struct CheckoutOrderRequest {
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub buyer: Option<Payer>,
    /// Creates the buyer's account. Not needed when logged in.
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CardOrderRequest {
    pub product_ids: Vec<String>,
    /// CPF is required for card payments.
    pub buyer: Payer,
    pub card_token: String,
    pub payment_method_id: String,
    #[serde(default)]
    pub installments: Option<u32>,
    #[serde(default)]
    pub issuer_id: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

pub async fn create_checkout_order(
    State(state): State<AppState>,
    OptionalSession(session): OptionalSession,
    Json(request): Json<CheckoutOrderRequest>,
) -> Result<Json<OrderOutcome>> {
    let order_request = OrderRequest {
        product_ids: request.product_ids,
        buyer: request.buyer,
        password: request.password,
        session,
    };

    let result = checkout::initiate_order(&state, &order_request, &PaymentFlow::Redirect).await?;
    Ok(Json(result))
}

pub async fn create_card_order(
    State(state): State<AppState>,
    OptionalSession(session): OptionalSession,
    Json(request): Json<CardOrderRequest>,
) -> Result<Json<OrderOutcome>> {
    if request.card_token.trim().is_empty() {
        return Err(AppError::BadRequest("card_token is required".into()));
    }
    if request.payment_method_id.trim().is_empty() {
        return Err(AppError::BadRequest("payment_method_id is required".into()));
    }

    let card = CardDetails {
        card_token: request.card_token,
        payment_method_id: request.payment_method_id,
        installments: request.installments.unwrap_or(1),
        issuer_id: request.issuer_id.filter(|id| !id.trim().is_empty()),
    };

    let order_request = OrderRequest {
        product_ids: request.product_ids,
        buyer: Some(request.buyer),
        password: request.password,
        session,
    };

    let result = checkout::initiate_order(&state, &order_request, &PaymentFlow::Card(card)).await?;
    Ok(Json(result))
}

/// Status polling for the return page. Accepts the order id or the
/// processor's reference.
pub async fn get_order_status(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<OrderStatusResponse>> {
    let conn = state.db.get()?;
    let order = queries::get_order_by_external_reference(&conn, reference.trim())?
        .or_not_found(msg::ORDER_NOT_FOUND)?;

    Ok(Json(OrderStatusResponse {
        order_id: order.id,
        status: order.status,
        total_cents: order.total_cents,
        created_at: order.created_at,
        updated_at: order.updated_at,
    }))
}
