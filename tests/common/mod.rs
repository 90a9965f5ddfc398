//! Test utilities and fixtures for storefront integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub use storefront::db::{AppState, create_pool, init_audit_db, init_db, queries};
pub use storefront::error::{AppError, Result as AppResult};
pub use storefront::handlers;
pub use storefront::identity::{self, SessionSigner, generate_session_secret};
pub use storefront::models::*;
pub use storefront::payments::{
    CardCharge, CardChargeRequest, CheckoutIntent, CheckoutIntentRequest, PaymentDetails,
    PaymentGateway,
};

pub const PACK_1_TITLE: &str = "Planilhas 6k Pro - 6.000 Planilhas Excel";
pub const PACK_2_TITLE: &str = "Pack Bônus - Dashboards e Planners Premium";
/// Passes both CPF check digits.
pub const TEST_CPF: &str = "529.982.247-25";

/// In-process stand-in for the payment processor.
///
/// Payments are kept by id, so whatever a test registers (or a card charge
/// creates) is what `fetch_payment_by_id` reports back to the reconciler.
#[derive(Default)]
pub struct MockGateway {
    payments: Mutex<HashMap<String, PaymentDetails>>,
    card_result: Mutex<Option<(OrderStatus, String)>>,
    unavailable: AtomicBool,
    reject_signatures: AtomicBool,
    pub checkout_calls: AtomicUsize,
    pub charge_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub last_checkout: Mutex<Option<CheckoutIntentRequest>>,
    pub last_charge: Mutex<Option<CardChargeRequest>>,
    on_checkout: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl MockGateway {
    /// Register (or replace) the processor's view of a payment.
    pub fn set_payment(&self, payment_id: &str, external_reference: Option<&str>, status: OrderStatus) {
        self.payments.lock().unwrap().insert(
            payment_id.to_string(),
            PaymentDetails {
                gateway_reference: payment_id.to_string(),
                status,
                status_detail: format!("mock_{}", status),
                payer_email: None,
                external_reference: external_reference.map(String::from),
            },
        );
    }

    /// Status returned by the next card charges (default: approved).
    pub fn set_card_result(&self, status: OrderStatus, detail: &str) {
        *self.card_result.lock().unwrap() = Some((status, detail.to_string()));
    }

    /// Make every call fail like a processor outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_reject_signatures(&self, reject: bool) {
        self.reject_signatures.store(reject, Ordering::SeqCst);
    }

    /// Run `f` while the next checkout intents are being created.
    pub fn set_on_checkout(&self, f: impl Fn() + Send + Sync + 'static) {
        *self.on_checkout.lock().unwrap() = Some(Box::new(f));
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(AppError::Gateway("mock processor unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn provider_name(&self) -> &'static str {
        "mock"
    }

    async fn create_checkout_intent(&self, request: &CheckoutIntentRequest) -> AppResult<CheckoutIntent> {
        self.checkout_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_checkout.lock().unwrap() = Some(request.clone());
        self.check_available()?;
        if let Some(f) = self.on_checkout.lock().unwrap().as_ref() {
            f();
        }

        let preference = format!("pref-{}", request.external_reference);
        Ok(CheckoutIntent {
            redirect_url: format!("https://mp.test/checkout?pref_id={}", preference),
            gateway_reference: preference,
        })
    }

    async fn charge_tokenized_card(&self, request: &CardChargeRequest) -> AppResult<CardCharge> {
        let n = self.charge_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_charge.lock().unwrap() = Some(request.clone());
        self.check_available()?;

        let (status, status_detail) = self
            .card_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or((OrderStatus::Approved, "accredited".to_string()));

        let payment_id = format!("card-{}", n);
        self.set_payment(&payment_id, Some(&request.external_reference), status);

        Ok(CardCharge {
            gateway_reference: payment_id,
            status,
            status_detail,
        })
    }

    async fn fetch_payment_by_id(&self, payment_id: &str) -> AppResult<PaymentDetails> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.payments
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| AppError::Gateway(format!("payment {} not found", payment_id)))
    }

    async fn find_payment_by_external_reference(&self, reference: &str) -> AppResult<Option<PaymentDetails>> {
        self.check_available()?;
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.external_reference.as_deref() == Some(reference))
            .cloned())
    }

    fn verify_webhook_signature(
        &self,
        _data_id: Option<&str>,
        _request_id: Option<&str>,
        _signature: Option<&str>,
    ) -> AppResult<bool> {
        Ok(!self.reject_signatures.load(Ordering::SeqCst))
    }
}

/// App state backed by temp-file databases and a [`MockGateway`].
///
/// File-backed pools so every pooled connection sees the same data.
pub struct TestContext {
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
    _dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_base_url("http://localhost:3000")
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = dir.path().join("storefront.db");
        let audit_path = dir.path().join("storefront_audit.db");

        let db = create_pool(db_path.to_str().unwrap(), Duration::from_secs(5)).unwrap();
        let audit = create_pool(audit_path.to_str().unwrap(), Duration::from_secs(5)).unwrap();
        init_db(&db.get().unwrap()).unwrap();
        init_audit_db(&audit.get().unwrap()).unwrap();

        let gateway = Arc::new(MockGateway::default());

        let state = AppState {
            db,
            audit,
            base_url: base_url.to_string(),
            download_base_url: "https://files.example.com/downloads".to_string(),
            gateway: gateway.clone(),
            sessions: SessionSigner::new(&generate_session_secret(), 24),
        };

        Self {
            state,
            gateway,
            _dir: dir,
        }
    }

    pub fn app(&self) -> Router {
        public_app(self.state.clone())
    }

    pub fn conn(&self) -> PooledConnection<SqliteConnectionManager> {
        self.state.db.get().unwrap()
    }

    pub fn audit_conn(&self) -> PooledConnection<SqliteConnectionManager> {
        self.state.audit.get().unwrap()
    }

    /// Create an identity directly and return it with a session token.
    pub fn create_identity(&self, email: &str, password: &str) -> (Identity, String) {
        let identity = create_test_identity(&self.conn(), email, password);
        let token = self.state.sessions.issue(&identity).unwrap().access_token;
        (identity, token)
    }

    pub fn order(&self, reference: &str) -> Order {
        queries::get_order_by_external_reference(&self.conn(), reference)
            .unwrap()
            .expect("order should exist")
    }

    pub fn order_count(&self) -> i64 {
        queries::count_orders(&self.conn()).unwrap()
    }
}

/// Create a Router with all public and webhook endpoints (without rate limiting for tests)
pub fn public_app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::public::router_without_rate_limit(&state))
        .merge(handlers::webhooks::router())
        .with_state(state)
}

pub fn create_test_identity(conn: &Connection, email: &str, password: &str) -> Identity {
    identity::provision_or_resolve(conn, email, Some(password))
        .expect("Failed to create test identity")
        .identity
}

pub fn create_test_order(conn: &Connection, email: &str, product_titles: &[&str]) -> Order {
    let line_items: Vec<LineItem> = product_titles
        .iter()
        .map(|title| LineItem {
            product_id: "pack_1".to_string(),
            product_title: title.to_string(),
            unit_price_cents: 1299,
        })
        .collect();
    let total_cents = line_items.iter().map(|i| i.unit_price_cents).sum();

    queries::create_order(
        conn,
        &CreateOrder {
            buyer_email: email.to_string(),
            line_items,
            total_cents,
            linked_identity_id: None,
        },
    )
    .expect("Failed to create test order")
}

/// Send a request and decode the JSON body (Null when empty or not JSON).
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

pub async fn post_json(app: Router, uri: &str, body: &Value, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    send(app, builder.body(Body::from(body.to_string())).unwrap()).await
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

/// Deliver a JSON-envelope payment notification for `payment_id`.
pub async fn deliver_payment_webhook(app: Router, payment_id: &str) -> (StatusCode, Value) {
    let body = serde_json::json!({
        "type": "payment",
        "action": "payment.updated",
        "data": { "id": payment_id }
    });
    post_json(app, "/webhook/mercadopago", &body, None).await
}
