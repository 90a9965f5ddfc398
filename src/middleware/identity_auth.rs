use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::db::AppState;
use crate::error::AppError;
use crate::identity::VerifiedSession;
use crate::util::extract_bearer_token;

/// The logged-in buyer, inserted by [`identity_auth`].
#[derive(Debug, Clone)]
pub struct IdentityContext {
    pub identity_id: String,
    pub email: String,
}

impl From<VerifiedSession> for IdentityContext {
    fn from(session: VerifiedSession) -> Self {
        Self {
            identity_id: session.identity_id,
            email: session.email,
        }
    }
}

/// Require a valid session token. Rejects with 401 otherwise.
pub async fn identity_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;
    let session = state.sessions.verify(token)?;

    request.extensions_mut().insert(IdentityContext::from(session));

    Ok(next.run(request).await)
}

/// Session for routes where logging in is optional (order creation).
///
/// No header means anonymous. A header that is present but invalid is a 401,
/// so a stale token never silently turns into a guest purchase.
#[derive(Debug, Clone)]
pub struct OptionalSession(pub Option<VerifiedSession>);

impl FromRequestParts<AppState> for OptionalSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key("Authorization") {
            return Ok(Self(None));
        }

        let token = extract_bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        Ok(Self(Some(state.sessions.verify(token)?)))
    }
}
