pub mod mercadopago;

pub use mercadopago::handle_mercadopago_webhook;

use axum::{Router, routing::post};

use crate::db::AppState;

/// Processor callbacks. Kept outside the rate limited public router.
pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/mercadopago", post(handle_mercadopago_webhook))
}
