use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::reconcile::{self, Notification, ReconcileOutcome};

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: ReconcileOutcome,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Mercado Pago notification endpoint.
///
/// Responds 200 once the notification is handled (or deliberately ignored).
/// Reconciliation failures answer 500 so the processor re-delivers.
pub async fn handle_mercadopago_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>)> {
    let notification = Notification::from_request(&body, &query);

    let verified = state.gateway.verify_webhook_signature(
        notification.data_id.as_deref(),
        header(&headers, "x-request-id"),
        header(&headers, "x-signature"),
    )?;
    if !verified {
        tracing::warn!(
            "Rejected {} webhook with invalid signature (data.id={:?})",
            state.gateway.provider_name(),
            notification.data_id
        );
        return Err(AppError::Unauthorized);
    }

    let outcome = reconcile::reconcile(&state, &notification).await?;
    tracing::debug!("Webhook handled: {:?}", outcome);

    Ok((
        StatusCode::OK,
        Json(WebhookResponse {
            received: true,
            outcome,
        }),
    ))
}
