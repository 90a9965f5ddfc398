use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Client-facing error messages shared across handlers.
pub mod msg {
    pub const ORDER_NOT_FOUND: &str = "Order not found";
    pub const IDENTITY_NOT_FOUND: &str = "Identity not found";
    pub const INVALID_EMAIL: &str = "Invalid email address";
    pub const INVALID_CPF: &str = "Invalid CPF";
    pub const CPF_REQUIRED: &str = "CPF is required for card payments";
    pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 6 characters";
    pub const PASSWORD_REQUIRED: &str = "Password is required to create an account";
    pub const BUYER_REQUIRED: &str = "Buyer email is required";
    pub const NO_PRODUCTS: &str = "At least one product is required";
    pub const EMPTY_PRODUCT_NAME: &str = "Product name is required";
    pub const ACCOUNT_EXISTS: &str = "An account already exists for this email. Please log in.";
    pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
    pub const ACCESS_DENIED: &str = "No approved purchase includes this product";
    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature";
    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::InvalidProduct(msg) => {
                (StatusCode::BAD_REQUEST, "Invalid product", Some(msg.clone()))
            }
            AppError::InvalidBundle(msg) => {
                (StatusCode::BAD_REQUEST, "Invalid bundle", Some(msg.clone()))
            }
            AppError::AlreadyExists(msg) => (StatusCode::CONFLICT, "Already exists", Some(msg.clone())),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "Forbidden", Some(msg.clone())),
            AppError::Gateway(msg) => {
                tracing::warn!("Payment gateway error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Payment gateway error", Some(msg.clone()))
            }
            AppError::Reconciliation(msg) => {
                tracing::error!("Reconciliation error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Reconciliation failed", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Converts `Option<T>` lookups into `NotFound` errors.
pub trait OptionExt<T> {
    fn or_not_found(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(msg.to_string()))
    }
}
