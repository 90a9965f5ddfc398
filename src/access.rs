//! Download access checks.
//!
//! Access is never stored. Every check re-reads the identity's orders, so a
//! grant exists exactly while an approved order includes the product.

use rusqlite::Connection;
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::{CreateDownloadLog, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Granted,
    Denied,
}

/// Whether any approved order linked to `identity_id` includes `product_name`.
pub fn has_access(conn: &Connection, identity_id: &str, product_name: &str) -> Result<bool> {
    if product_name.trim().is_empty() {
        return Ok(false);
    }

    let orders = queries::get_orders_for_identity(conn, identity_id)?;
    Ok(orders
        .iter()
        .any(|order| order.status == OrderStatus::Approved && order.includes_product(product_name)))
}

/// Decide access and, when granted, append to the download log.
///
/// A failed log write is reported at `warn` and does not change the decision.
pub fn check_and_log_access(
    state: &AppState,
    identity_id: &str,
    product_name: &str,
    source_address: &str,
) -> Result<AccessDecision> {
    let granted = {
        let conn = state.db.get()?;
        has_access(&conn, identity_id, product_name)?
    };

    if !granted {
        tracing::debug!("Access denied: identity={}, product={:?}", identity_id, product_name);
        return Ok(AccessDecision::Denied);
    }

    let entry = CreateDownloadLog {
        identity_id: identity_id.to_string(),
        product_name: product_name.trim().to_string(),
        source_address: source_address.to_string(),
    };

    let logged = state
        .audit
        .get()
        .map_err(Into::into)
        .and_then(|conn| queries::create_download_log(&conn, &entry));

    if let Err(e) = logged {
        tracing::warn!(
            "Failed to write download log for identity {} ({}): {}",
            identity_id,
            entry.product_name,
            e
        );
    }

    tracing::info!("Access granted: identity={}, product={}", identity_id, entry.product_name);
    Ok(AccessDecision::Granted)
}

/// Build the download link for a granted product.
pub fn download_url(base: &str, product_name: &str) -> Result<String> {
    let mut url = url::Url::parse(base)
        .map_err(|e| AppError::Internal(format!("Invalid download base URL: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| AppError::Internal("Download base URL cannot carry a path".into()))?
        .pop_if_empty()
        .push(product_name.trim());
    Ok(url.to_string())
}
