//! Tests for POST /download access checks and the download log.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn approved_order_for(ctx: &TestContext, identity: &Identity, titles: &[&str]) -> Order {
    let order = create_test_order(&ctx.conn(), &identity.email, titles);
    queries::link_order_identity(&ctx.conn(), &order.id, &identity.id).unwrap();
    queries::update_order_status(&mut ctx.conn(), &order.id, OrderStatus::Approved, Some("PAY-T")).unwrap();
    order
}

#[tokio::test]
async fn test_download_granted_for_approved_purchase() {
    let ctx = TestContext::new();
    let (identity, token) = ctx.create_identity("a@x.com", "secret1");
    approved_order_for(&ctx, &identity, &[PACK_1_TITLE]);

    let (status, body) = post_json(
        ctx.app(),
        "/download",
        &json!({ "product_name": "Planilhas 6k Pro" }),
        Some(&token),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["granted"], true);
    assert_eq!(
        body["download_url"],
        "https://files.example.com/downloads/Planilhas%206k%20Pro"
    );

    let logs = queries::list_download_logs_for_identity(&ctx.audit_conn(), &identity.id).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].product_name, "Planilhas 6k Pro");
}

#[tokio::test]
async fn test_download_records_forwarded_address() {
    let ctx = TestContext::new();
    let (identity, token) = ctx.create_identity("a@x.com", "secret1");
    approved_order_for(&ctx, &identity, &[PACK_1_TITLE]);

    let request = Request::builder()
        .method("POST")
        .uri("/download")
        .header("content-type", "application/json")
        .header("Authorization", format!("Bearer {}", token))
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .body(Body::from(json!({ "product_name": PACK_1_TITLE }).to_string()))
        .unwrap();
    let (status, _) = send(ctx.app(), request).await;
    assert_eq!(status, StatusCode::OK);

    let logs = queries::list_download_logs_for_identity(&ctx.audit_conn(), &identity.id).unwrap();
    assert_eq!(logs[0].source_address, "203.0.113.7");
}

#[tokio::test]
async fn test_download_denied_for_other_product_without_log() {
    let ctx = TestContext::new();
    let (identity, token) = ctx.create_identity("a@x.com", "secret1");
    approved_order_for(&ctx, &identity, &[PACK_1_TITLE]);

    let (status, body) = post_json(
        ctx.app(),
        "/download",
        &json!({ "product_name": "Pack Bônus" }),
        Some(&token),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");
    assert!(queries::list_download_logs_for_identity(&ctx.audit_conn(), &identity.id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_download_denied_for_pending_order() {
    let ctx = TestContext::new();
    let (identity, token) = ctx.create_identity("a@x.com", "secret1");
    let order = create_test_order(&ctx.conn(), "a@x.com", &[PACK_1_TITLE]);
    queries::link_order_identity(&ctx.conn(), &order.id, &identity.id).unwrap();

    let (status, _) = post_json(
        ctx.app(),
        "/download",
        &json!({ "product_name": "Planilhas 6k Pro" }),
        Some(&token),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_download_does_not_cross_identities() {
    let ctx = TestContext::new();
    let (buyer, _) = ctx.create_identity("a@x.com", "secret1");
    let (_, other_token) = ctx.create_identity("b@x.com", "secret1");
    approved_order_for(&ctx, &buyer, &[PACK_1_TITLE]);

    let (status, _) = post_json(
        ctx.app(),
        "/download",
        &json!({ "product_name": "Planilhas 6k Pro" }),
        Some(&other_token),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_download_requires_session() {
    let ctx = TestContext::new();

    let body = json!({ "product_name": "Planilhas 6k Pro" });
    let (status, _) = post_json(ctx.app(), "/download", &body, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post_json(ctx.app(), "/download", &body, Some("not-a-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_download_empty_product_name_is_400() {
    let ctx = TestContext::new();
    let (_, token) = ctx.create_identity("a@x.com", "secret1");

    let (status, _) = post_json(ctx.app(), "/download", &json!({ "product_name": "  " }), Some(&token)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
