//! Per-IP rate limiting for the public API.
//!
//! Tiers:
//! - Strict: order creation (`POST /orders/*`), which calls the payment processor
//! - Standard: `/identity/exists`, `/auth/login`, `/download`
//! - Relaxed: `/health`, order status polling (`GET /orders/{reference}`)
//!
//! Limits come from `RATE_LIMIT_{STRICT,STANDARD,RELAXED}_RPM`.

use std::sync::Arc;
use std::time::Duration;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

use crate::config::RateLimitConfig;

pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Layer allowing `requests_per_minute` per client IP, refilled evenly over the minute.
fn create_layer(requests_per_minute: u32) -> RateLimitLayer {
    let requests_per_minute = requests_per_minute.max(1);
    let period_ms = (60_000 / requests_per_minute as u64).max(1);

    let config = GovernorConfigBuilder::default()
        .period(Duration::from_millis(period_ms))
        .burst_size(requests_per_minute)
        .finish()
        .expect("period and burst size are non-zero");

    GovernorLayer::new(Arc::new(config))
}

/// The three tiers built from one config.
pub struct RateLimitTiers {
    pub strict: RateLimitLayer,
    pub standard: RateLimitLayer,
    pub relaxed: RateLimitLayer,
}

impl RateLimitTiers {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            strict: create_layer(config.strict_rpm),
            standard: create_layer(config.standard_rpm),
            relaxed: create_layer(config.relaxed_rpm),
        }
    }
}
