//! Tests for the transparent (tokenized card) flow.

use std::sync::atomic::Ordering;

use axum::http::StatusCode;
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn card_body(products: &[&str]) -> serde_json::Value {
    json!({
        "product_ids": products,
        "buyer": { "email": "a@x.com", "name": "Ana", "cpf": TEST_CPF },
        "card_token": "tok_123",
        "payment_method_id": "visa",
        "installments": 1,
        "password": "secret1"
    })
}

#[tokio::test]
async fn test_approved_card_settles_order_and_creates_identity() {
    let ctx = TestContext::new();

    let (status, body) = post_json(ctx.app(), "/orders/card", &card_body(&["pack_1"]), None).await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["status_detail"], "accredited");
    assert_eq!(body["session_tokens"]["token_type"], "Bearer");

    let payment_id = body["gateway_payment_id"].as_str().unwrap();
    let order = ctx.order(body["order_id"].as_str().unwrap());
    assert_eq!(order.status, OrderStatus::Approved);
    assert_eq!(order.payment_reference.as_deref(), Some(payment_id));

    let identity = queries::get_identity_by_email(&ctx.conn(), "a@x.com").unwrap().unwrap();
    assert_eq!(order.linked_identity_id.as_deref(), Some(identity.id.as_str()));
}

#[tokio::test]
async fn test_card_charge_uses_catalog_amount_and_cleaned_cpf() {
    let ctx = TestContext::new();

    let mut body = card_body(&["pack_1", "pack_2"]);
    body["amount_cents"] = json!(1);
    let (status, _) = post_json(ctx.app(), "/orders/card", &body, None).await;
    assert_eq!(status, StatusCode::OK);

    let charge = ctx.gateway.last_charge.lock().unwrap().clone().unwrap();
    assert_eq!(charge.amount_cents, 2298);
    assert_eq!(charge.payer.cpf.as_deref(), Some("52998224725"));
    assert_eq!(charge.card_token, "tok_123");
    assert_eq!(charge.installments, 1);
}

#[tokio::test]
async fn test_rejected_card_reports_detail_and_creates_no_identity() {
    let ctx = TestContext::new();
    ctx.gateway.set_card_result(OrderStatus::Rejected, "cc_rejected_insufficient_amount");

    let (status, body) = post_json(ctx.app(), "/orders/card", &card_body(&["pack_1"]), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["status_detail"], "cc_rejected_insufficient_amount");
    assert!(body.get("session_tokens").is_none());

    let order = ctx.order(body["order_id"].as_str().unwrap());
    assert_eq!(order.status, OrderStatus::Rejected);
    assert!(!identity::identity_exists(&ctx.conn(), "a@x.com").unwrap());
}

#[tokio::test]
async fn test_in_process_card_stays_pending_with_reference() {
    let ctx = TestContext::new();
    ctx.gateway.set_card_result(OrderStatus::Pending, "pending_contingency");

    let (status, body) = post_json(ctx.app(), "/orders/card", &card_body(&["pack_1"]), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    let order = ctx.order(body["order_id"].as_str().unwrap());
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_reference.as_deref(), body["gateway_payment_id"].as_str());
}

#[tokio::test]
async fn test_pending_card_creates_identity_but_withholds_access() {
    let ctx = TestContext::new();
    ctx.gateway.set_card_result(OrderStatus::Pending, "pending_review_manual");

    let (status, body) = post_json(ctx.app(), "/orders/card", &card_body(&["pack_1"]), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    let token = body["session_tokens"]["access_token"].as_str().unwrap().to_string();

    let identity = queries::get_identity_by_email(&ctx.conn(), "a@x.com").unwrap().unwrap();
    let order = ctx.order(body["order_id"].as_str().unwrap());
    assert_eq!(order.linked_identity_id.as_deref(), Some(identity.id.as_str()));

    let (status, _) = post_json(
        ctx.app(),
        "/download",
        &json!({ "product_name": PACK_1_TITLE }),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_card_requires_valid_cpf() {
    let ctx = TestContext::new();

    let mut missing = card_body(&["pack_1"]);
    missing["buyer"] = json!({ "email": "a@x.com" });
    let (status, _) = post_json(ctx.app(), "/orders/card", &missing, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut invalid = card_body(&["pack_1"]);
    invalid["buyer"]["cpf"] = json!("123.456.789-00");
    let (status, body) = post_json(ctx.app(), "/orders/card", &invalid, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "Invalid CPF");

    assert_eq!(ctx.order_count(), 0);
    assert_eq!(ctx.gateway.charge_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_card_requires_token_and_method() {
    let ctx = TestContext::new();

    let mut body = card_body(&["pack_1"]);
    body["card_token"] = json!("  ");
    let (status, _) = post_json(ctx.app(), "/orders/card", &body, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(ctx.gateway.charge_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_card_existing_email_is_409_and_never_charged() {
    let ctx = TestContext::new();
    ctx.create_identity("a@x.com", "original1");

    let (status, _) = post_json(ctx.app(), "/orders/card", &card_body(&["pack_1"]), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(ctx.order_count(), 0);
    assert_eq!(ctx.gateway.charge_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_card_gateway_failure_is_502_and_order_stays_pending() {
    let ctx = TestContext::new();
    ctx.gateway.set_unavailable(true);

    let (status, _) = post_json(ctx.app(), "/orders/card", &card_body(&["pack_1"]), None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let charge = ctx.gateway.last_charge.lock().unwrap().clone().unwrap();
    let order = ctx.order(&charge.external_reference);
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(!identity::identity_exists(&ctx.conn(), "a@x.com").unwrap());
}

#[tokio::test]
async fn test_logged_in_card_purchase_links_existing_identity() {
    let ctx = TestContext::new();
    let (identity, token) = ctx.create_identity("a@x.com", "secret1");

    let body = json!({
        "product_ids": ["pack_2"],
        "buyer": { "email": "a@x.com", "cpf": TEST_CPF },
        "card_token": "tok_123",
        "payment_method_id": "master"
    });
    let (status, body) = post_json(ctx.app(), "/orders/card", &body, Some(&token)).await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert!(body.get("session_tokens").is_none());
    let order = ctx.order(body["order_id"].as_str().unwrap());
    assert_eq!(order.status, OrderStatus::Approved);
    assert_eq!(order.linked_identity_id.as_deref(), Some(identity.id.as_str()));
    assert_eq!(queries::count_identities_by_email(&ctx.conn(), "a@x.com").unwrap(), 1);
}
