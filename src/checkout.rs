//! Order orchestration: validate a purchase, record it, then hand it to the
//! payment gateway.
//!
//! The order row is always written before the gateway is contacted. Anything
//! that fails afterwards leaves the row `pending` for the webhook or the stale
//! order pass to settle. Nothing here keeps state between calls.

use rusqlite::Connection;
use serde::Serialize;

use crate::catalog::{self, Product};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::identity::{self, SessionTokens, VerifiedSession};
use crate::models::{CreateOrder, Identity, LineItem, Order, OrderStatus, StatusUpdate};
use crate::payments::{CardChargeRequest, CheckoutIntentRequest, Payer};
use crate::util::{normalize_cpf, validate_email, validate_password};

/// A purchase request after transport decoding. Amounts are never part of it.
#[derive(Debug, Clone, Default)]
pub struct OrderRequest {
    pub product_ids: Vec<String>,
    pub buyer: Option<Payer>,
    pub password: Option<String>,
    /// Present when the request carried a valid session token.
    pub session: Option<VerifiedSession>,
}

/// Card data tokenized client-side.
#[derive(Debug, Clone)]
pub struct CardDetails {
    pub card_token: String,
    pub payment_method_id: String,
    pub installments: u32,
    pub issuer_id: Option<String>,
}

/// How the buyer pays.
#[derive(Debug, Clone)]
pub enum PaymentFlow {
    /// Hosted checkout page; settled later by the webhook.
    Redirect,
    /// Client-tokenized card, charged immediately.
    Card(CardDetails),
}

/// Result of [`initiate_order`], shaped by the flow that produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OrderOutcome {
    Redirect(RedirectCheckout),
    Card(CardCheckout),
}

#[derive(Debug, Clone, Serialize)]
pub struct RedirectCheckout {
    pub order_id: String,
    pub checkout_redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_tokens: Option<SessionTokens>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardCheckout {
    pub order_id: String,
    pub gateway_payment_id: String,
    pub status: OrderStatus,
    pub status_detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_tokens: Option<SessionTokens>,
}

/// Who is buying, decided before any row is written.
enum Buyer {
    /// Logged-in identity; the order is linked immediately.
    Authenticated(Identity),
    /// New account to be created with this password.
    Signup { email: String, password: String },
}

impl Buyer {
    fn email(&self) -> &str {
        match self {
            Buyer::Authenticated(identity) => &identity.email,
            Buyer::Signup { email, .. } => email,
        }
    }

    fn identity_id(&self) -> Option<String> {
        match self {
            Buyer::Authenticated(identity) => Some(identity.id.clone()),
            Buyer::Signup { .. } => None,
        }
    }
}

struct PreparedOrder {
    products: Vec<&'static Product>,
    buyer: Buyer,
    payer: Payer,
}

/// Add-ons need their base product in the same order, unless the buyer is
/// already logged in (they may own the base from an earlier purchase).
pub fn check_bundle(products: &[&Product], authenticated: bool) -> Result<()> {
    if authenticated {
        return Ok(());
    }

    for product in products {
        if let Some(base) = product.requires {
            if !products.iter().any(|p| p.id == base) {
                let base_title = catalog::get_product(base).map(|p| p.title).unwrap_or(base);
                return Err(AppError::InvalidBundle(format!(
                    "{} can only be purchased together with {}",
                    product.title, base_title
                )));
            }
        }
    }

    Ok(())
}

fn line_items(products: &[&Product]) -> Vec<LineItem> {
    products
        .iter()
        .map(|p| LineItem {
            product_id: p.id.to_string(),
            product_title: p.title.to_string(),
            unit_price_cents: p.unit_price_cents,
        })
        .collect()
}

/// Steps shared by both flows: products, bundling, buyer checks.
/// Writes nothing.
fn prepare(conn: &Connection, request: &OrderRequest, require_cpf: bool) -> Result<PreparedOrder> {
    let products = catalog::resolve_all(&request.product_ids)?;
    check_bundle(&products, request.session.is_some())?;

    let buyer = match &request.session {
        Some(session) => {
            let identity =
                queries::get_identity_by_id(conn, &session.identity_id)?.ok_or(AppError::Unauthorized)?;
            Buyer::Authenticated(identity)
        }
        None => {
            let email = request
                .buyer
                .as_ref()
                .map(|b| b.email.trim())
                .filter(|e| !e.is_empty())
                .ok_or_else(|| AppError::BadRequest(msg::BUYER_REQUIRED.into()))?;
            validate_email(email)?;

            let password = request
                .password
                .as_deref()
                .ok_or_else(|| AppError::BadRequest(msg::PASSWORD_REQUIRED.into()))?;
            validate_password(password)?;

            // Fail before anything is written or charged.
            if identity::identity_exists(conn, email)? {
                return Err(AppError::AlreadyExists(msg::ACCOUNT_EXISTS.into()));
            }

            Buyer::Signup {
                email: queries::normalize_email(email),
                password: password.to_string(),
            }
        }
    };

    let cpf = match request.buyer.as_ref().and_then(|b| b.cpf.as_deref()) {
        Some(cpf) => Some(normalize_cpf(cpf)?),
        None if require_cpf => return Err(AppError::BadRequest(msg::CPF_REQUIRED.into())),
        None => None,
    };

    let payer = Payer {
        email: buyer.email().to_string(),
        name: request
            .buyer
            .as_ref()
            .and_then(|b| b.name.clone())
            .filter(|n| !n.trim().is_empty()),
        cpf,
    };

    Ok(PreparedOrder {
        products,
        buyer,
        payer,
    })
}

fn create_pending_order(conn: &Connection, prepared: &PreparedOrder) -> Result<Order> {
    let order = queries::create_order(
        conn,
        &CreateOrder {
            buyer_email: prepared.buyer.email().to_string(),
            line_items: line_items(&prepared.products),
            total_cents: catalog::total_cents(&prepared.products),
            linked_identity_id: prepared.buyer.identity_id(),
        },
    )?;

    tracing::info!(
        "Order created: id={}, email={}, total_cents={}, items={}",
        order.id,
        order.buyer_email,
        order.total_cents,
        order.line_items.len()
    );

    Ok(order)
}

/// Create the signup identity and link it to the order.
fn provision_signup(conn: &Connection, order: &Order, email: &str, password: &str) -> Result<Identity> {
    let provisioned = identity::provision_or_resolve(conn, email, Some(password))?;
    queries::link_order_identity(conn, &order.id, &provisioned.identity.id)?;
    Ok(provisioned.identity)
}

fn notification_url(state: &AppState) -> Option<String> {
    // The processor only delivers to public https endpoints.
    state
        .base_url
        .starts_with("https://")
        .then(|| format!("{}/webhook/mercadopago", state.base_url.trim_end_matches('/')))
}

fn return_url(state: &AppState, order_id: &str) -> String {
    format!("{}/checkout/return?order={}", state.base_url.trim_end_matches('/'), order_id)
}

/// Validate a purchase, record it as `pending`, then run the requested flow.
pub async fn initiate_order(state: &AppState, request: &OrderRequest, flow: &PaymentFlow) -> Result<OrderOutcome> {
    match flow {
        PaymentFlow::Redirect => initiate_redirect_order(state, request)
            .await
            .map(OrderOutcome::Redirect),
        PaymentFlow::Card(card) => initiate_card_order(state, request, card)
            .await
            .map(OrderOutcome::Card),
    }
}

/// Redirect flow: the customer pays on the processor's hosted page and the
/// order stays `pending` until the webhook arrives.
async fn initiate_redirect_order(state: &AppState, request: &OrderRequest) -> Result<RedirectCheckout> {
    let (order, prepared) = {
        let conn = state.db.get()?;
        let prepared = prepare(&conn, request, false)?;
        let order = create_pending_order(&conn, &prepared)?;
        (order, prepared)
    };

    let intent = state
        .gateway
        .create_checkout_intent(&CheckoutIntentRequest {
            external_reference: order.id.clone(),
            line_items: order.line_items.clone(),
            payer: Some(prepared.payer.clone()),
            notification_url: notification_url(state),
            return_url: return_url(state, &order.id),
        })
        .await
        .inspect_err(|e| {
            tracing::warn!("Checkout intent failed for order {} (left pending): {}", order.id, e)
        })?;

    tracing::info!(
        "{} checkout created: order={}, reference={}",
        state.gateway.provider_name(),
        order.id,
        intent.gateway_reference
    );

    let conn = state.db.get()?;

    // The webhook matches on our order id, so losing this write is recoverable.
    if let Err(e) = queries::set_order_payment_reference(&conn, &order.id, &intent.gateway_reference) {
        tracing::error!("Failed to store checkout reference for order {}: {}", order.id, e);
    }

    // Linked before the redirect URL is handed out, so before any notification.
    let session_tokens = signup_session(state, &conn, &order, &prepared.buyer);

    Ok(RedirectCheckout {
        order_id: order.id,
        checkout_redirect_url: intent.redirect_url,
        session_tokens,
    })
}

/// Transparent flow: charge a client-tokenized card and apply the result now.
///
/// Once the charge call has been made, later local failures are logged and
/// the charge result is still returned; the webhook settles the row.
async fn initiate_card_order(
    state: &AppState,
    request: &OrderRequest,
    card: &CardDetails,
) -> Result<CardCheckout> {
    let (order, prepared) = {
        let conn = state.db.get()?;
        let prepared = prepare(&conn, request, true)?;
        let order = create_pending_order(&conn, &prepared)?;
        (order, prepared)
    };

    let description = order
        .line_items
        .iter()
        .map(|item| item.product_title.as_str())
        .collect::<Vec<_>>()
        .join(" + ");

    let charge = state
        .gateway
        .charge_tokenized_card(&CardChargeRequest {
            external_reference: order.id.clone(),
            amount_cents: order.total_cents,
            description,
            card_token: card.card_token.clone(),
            payment_method_id: card.payment_method_id.clone(),
            installments: card.installments.max(1),
            issuer_id: card.issuer_id.clone(),
            payer: prepared.payer.clone(),
            notification_url: notification_url(state),
        })
        .await
        .inspect_err(|e| tracing::warn!("Card charge failed for order {} (left pending): {}", order.id, e))?;

    tracing::info!(
        "{} card charge: order={}, payment={}, status={}, detail={}",
        state.gateway.provider_name(),
        order.id,
        charge.gateway_reference,
        charge.status,
        charge.status_detail
    );

    let session_tokens = match state.db.get() {
        Ok(mut conn) => settle_card_charge(state, &mut conn, &order, &prepared.buyer, &charge.gateway_reference, charge.status),
        Err(e) => {
            tracing::error!("Failed to record card charge for order {}: {}", order.id, e);
            None
        }
    };

    Ok(CardCheckout {
        order_id: order.id,
        gateway_payment_id: charge.gateway_reference,
        status: charge.status,
        status_detail: charge.status_detail,
        session_tokens,
    })
}

/// Create and link the signup identity for an order the processor accepted,
/// returning its session tokens.
///
/// The checkout or charge already exists at this point, so failures are
/// logged and the caller still gets its result. A buyer who lost a signup race
/// is linked by email when the order is approved.
fn signup_session(state: &AppState, conn: &Connection, order: &Order, buyer: &Buyer) -> Option<SessionTokens> {
    let Buyer::Signup { email, password } = buyer else {
        return None;
    };

    match provision_signup(conn, order, email, password) {
        Ok(identity) => state
            .sessions
            .issue(&identity)
            .inspect_err(|e| tracing::error!("Failed to issue session for {}: {}", identity.id, e))
            .ok(),
        Err(e) => {
            tracing::error!("Identity provisioning failed for order {}: {}", order.id, e);
            None
        }
    }
}

/// Record the charge outcome and set up the buyer's account unless the charge
/// was refused. Access still waits for `approved`.
fn settle_card_charge(
    state: &AppState,
    conn: &mut Connection,
    order: &Order,
    buyer: &Buyer,
    payment_id: &str,
    status: OrderStatus,
) -> Option<SessionTokens> {
    match queries::update_order_status(conn, &order.id, status, Some(payment_id)) {
        Ok(StatusUpdate::Applied { .. }) | Ok(StatusUpdate::Unchanged) => {}
        Ok(other) => {
            tracing::warn!("Card charge status for order {} not applied: {:?}", order.id, other);
        }
        Err(e) => {
            tracing::error!("Failed to record card charge for order {}: {}", order.id, e);
            return None;
        }
    }

    if matches!(status, OrderStatus::Rejected | OrderStatus::Cancelled) {
        return None;
    }

    signup_session(state, conn, order, buyer)
}
