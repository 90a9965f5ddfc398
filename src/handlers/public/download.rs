use axum::{Extension, extract::State};
use serde::{Deserialize, Serialize};

use crate::access::{self, AccessDecision};
use crate::db::AppState;
use crate::error::{AppError, Result, msg};
use crate::extractors::{ClientAddress, Json};
use crate::middleware::IdentityContext;

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub product_name: String,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub granted: bool,
    pub download_url: String,
}

pub async fn request_download(
    State(state): State<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    ClientAddress(source_address): ClientAddress,
    Json(request): Json<DownloadRequest>,
) -> Result<Json<DownloadResponse>> {
    let product_name = request.product_name.trim();
    if product_name.is_empty() {
        return Err(AppError::BadRequest(msg::EMPTY_PRODUCT_NAME.into()));
    }

    match access::check_and_log_access(&state, &ctx.identity_id, product_name, &source_address)? {
        AccessDecision::Granted => Ok(Json(DownloadResponse {
            granted: true,
            download_url: access::download_url(&state.download_base_url, product_name)?,
        })),
        AccessDecision::Denied => Err(AppError::Forbidden(msg::ACCESS_DENIED.into())),
    }
}
