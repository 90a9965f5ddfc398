//! Tests for POST /identity/exists and POST /auth/login.

use axum::http::StatusCode;
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test]
async fn test_identity_exists() {
    let ctx = TestContext::new();
    ctx.create_identity("a@x.com", "secret1");

    let (status, body) = post_json(ctx.app(), "/identity/exists", &json!({ "email": " A@X.com " }), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exists"], true);

    let (status, body) = post_json(ctx.app(), "/identity/exists", &json!({ "email": "b@x.com" }), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exists"], false);
}

#[tokio::test]
async fn test_identity_exists_rejects_invalid_email() {
    let ctx = TestContext::new();
    let (status, body) = post_json(ctx.app(), "/identity/exists", &json!({ "email": "nope" }), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad request");
}

#[tokio::test]
async fn test_malformed_json_is_json_400() {
    let ctx = TestContext::new();
    let (status, body) = post_json(ctx.app(), "/identity/exists", &json!({ "mail": "a@x.com" }), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn test_login_issues_usable_session() {
    let ctx = TestContext::new();
    let (identity, _) = ctx.create_identity("a@x.com", "secret1");

    let (status, body) = post_json(
        ctx.app(),
        "/auth/login",
        &json!({ "email": "a@x.com", "password": "secret1" }),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let token = body["session_tokens"]["access_token"].as_str().unwrap();
    let session = ctx.state.sessions.verify(token).unwrap();
    assert_eq!(session.identity_id, identity.id);
}

#[tokio::test]
async fn test_login_wrong_password_or_unknown_email_is_401() {
    let ctx = TestContext::new();
    ctx.create_identity("a@x.com", "secret1");

    for (email, password) in [("a@x.com", "wrong-pass"), ("b@x.com", "secret1")] {
        let (status, _) = post_json(
            ctx.app(),
            "/auth/login",
            &json!({ "email": email, "password": password }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} / {}", email, password);
    }
}
