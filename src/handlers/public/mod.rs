mod download;
mod identity;
mod orders;

pub use download::*;
pub use identity::*;
pub use orders::*;

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::middleware::identity_auth;
use crate::rate_limit::RateLimitTiers;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn order_writes() -> Router<AppState> {
    Router::new()
        .route("/orders/checkout", post(create_checkout_order))
        .route("/orders/card", post(create_card_order))
}

fn account_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/identity/exists", post(identity_exists))
        .route("/auth/login", post(login))
        .merge(
            Router::new()
                .route("/download", post(request_download))
                .layer(middleware::from_fn_with_state(state.clone(), identity_auth)),
        )
}

fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/orders/{reference}", get(get_order_status))
}

/// Public routes with per-IP rate limits.
/// Rate limiting needs the peer address, so serve with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(state: &AppState, rate_limit: RateLimitConfig) -> Router<AppState> {
    let tiers = RateLimitTiers::new(&rate_limit);

    Router::new()
        .merge(order_writes().layer(tiers.strict))
        .merge(account_routes(state).layer(tiers.standard))
        .merge(read_routes().layer(tiers.relaxed))
}

/// Same routes without rate limiting, for tests and trusted deployments.
pub fn router_without_rate_limit(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(order_writes())
        .merge(account_routes(state))
        .merge(read_routes())
}
