use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::identity::{self, SessionTokens};
use crate::util::validate_email;

#[derive(Debug, Deserialize)]
pub struct IdentityExistsRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct IdentityExistsResponse {
    pub exists: bool,
}

/// Lets the checkout page ask for a login instead of a new password.
pub async fn identity_exists(
    State(state): State<AppState>,
    Json(request): Json<IdentityExistsRequest>,
) -> Result<Json<IdentityExistsResponse>> {
    validate_email(&request.email)?;

    let conn = state.db.get()?;
    let exists = identity::identity_exists(&conn, &request.email)?;

    Ok(Json(IdentityExistsResponse { exists }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub session_tokens: SessionTokens,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let identity = {
        let conn = state.db.get()?;
        identity::authenticate(&conn, &request.email, &request.password).inspect_err(|e| {
            if matches!(e, AppError::Unauthorized) {
                tracing::debug!("Login failed for {}: {}", request.email.trim(), msg::INVALID_CREDENTIALS);
            }
        })?
    };

    let session_tokens = state.sessions.issue(&identity)?;
    tracing::info!("Identity {} logged in", identity.id);

    Ok(Json(LoginResponse { session_tokens }))
}
