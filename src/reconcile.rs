//! Payment notification reconciliation.
//!
//! Notifications only tell us *that* a payment changed. The status always
//! comes from the processor's API, and is applied through the order store's
//! monotonic update, so duplicates and out-of-order deliveries are harmless.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::{Order, OrderStatus, StatusUpdate};
use crate::payments::PaymentDetails;

/// Upper bound on orders examined per stale pass.
const STALE_BATCH_LIMIT: i64 = 500;

/// A processor notification, reduced to the fields we act on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notification {
    /// `type` (or legacy `topic`), e.g. "payment".
    pub kind: Option<String>,
    /// e.g. "payment.updated"
    pub action: Option<String>,
    /// The resource id, for payments the payment id.
    pub data_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotificationBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    topic: Option<String>,
    action: Option<String>,
    data: Option<NotificationData>,
}

#[derive(Debug, Deserialize)]
struct NotificationData {
    id: Option<serde_json::Value>,
}

fn value_to_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Notification {
    /// Build a notification from the request body and query string.
    ///
    /// The processor sends either a JSON envelope `{type, action, data: {id}}`
    /// or bare query parameters (`?type=payment&data.id=...` or the older
    /// `?topic=payment&id=...`). Body fields win when both are present.
    pub fn from_request(body: &[u8], query: &HashMap<String, String>) -> Self {
        let parsed = if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            serde_json::from_slice::<NotificationBody>(body)
                .inspect_err(|e| tracing::debug!("Notification body is not a JSON envelope: {}", e))
                .ok()
        };

        let from_query = |key: &str| {
            query
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let (body_kind, body_action, body_id) = match parsed {
            Some(body) => (
                body.kind.or(body.topic),
                body.action,
                body.data.and_then(|d| d.id).as_ref().and_then(value_to_id),
            ),
            None => (None, None, None),
        };

        Self {
            kind: body_kind.or_else(|| from_query("type")).or_else(|| from_query("topic")),
            action: body_action,
            data_id: body_id
                .or_else(|| from_query("data.id"))
                .or_else(|| from_query("id")),
        }
    }

    pub fn is_payment(&self) -> bool {
        self.kind.as_deref() == Some("payment")
            || self.action.as_deref().is_some_and(|a| a.starts_with("payment."))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Not a payment notification.
    Ignored,
    Applied {
        order_id: String,
        previous: OrderStatus,
        status: OrderStatus,
    },
    Unchanged {
        order_id: String,
        status: OrderStatus,
    },
    /// The order is already terminal with a different status.
    Rejected {
        order_id: String,
        current: OrderStatus,
        reported: OrderStatus,
    },
}

fn reconciliation_error(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Reconciliation(format!("{}: {}", context, e))
}

/// Process one notification. Errors are returned as `Reconciliation` so the
/// sender re-delivers; there is no retry loop here.
pub async fn reconcile(state: &AppState, notification: &Notification) -> Result<ReconcileOutcome> {
    if !notification.is_payment() {
        tracing::debug!(
            "Ignoring notification: type={:?}, action={:?}",
            notification.kind,
            notification.action
        );
        return Ok(ReconcileOutcome::Ignored);
    }

    let payment_id = notification
        .data_id
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Payment notification without data.id".into()))?;

    let payment = state
        .gateway
        .fetch_payment_by_id(payment_id)
        .await
        .map_err(|e| reconciliation_error(&format!("fetching payment {}", payment_id), e))?;

    let mut conn = state
        .db
        .get()
        .map_err(|e| reconciliation_error("acquiring connection", e))?;
    apply_payment(&mut conn, &payment)
}

/// Apply the processor's view of a payment to the matching order.
///
/// The order is found by the payment's external reference (our order id),
/// falling back to the payment id itself for orders whose reference was
/// recorded from a card charge.
pub fn apply_payment(conn: &mut Connection, payment: &PaymentDetails) -> Result<ReconcileOutcome> {
    let key = payment
        .external_reference
        .as_deref()
        .unwrap_or(&payment.gateway_reference);

    let update = queries::update_order_status(conn, key, payment.status, Some(&payment.gateway_reference))
        .map_err(|e| reconciliation_error(&format!("updating order {}", key), e))?;

    let no_order = || {
        AppError::Reconciliation(format!(
            "No order for payment {} (reference {})",
            payment.gateway_reference, key
        ))
    };

    let order = queries::get_order_by_external_reference(conn, key)
        .map_err(|e| reconciliation_error(&format!("loading order {}", key), e))?
        .ok_or_else(no_order)?;

    let outcome = match update {
        StatusUpdate::Applied { previous } => ReconcileOutcome::Applied {
            order_id: order.id.clone(),
            previous,
            status: order.status,
        },
        StatusUpdate::Unchanged => ReconcileOutcome::Unchanged {
            order_id: order.id.clone(),
            status: order.status,
        },
        StatusUpdate::Rejected { current } => ReconcileOutcome::Rejected {
            order_id: order.id.clone(),
            current,
            reported: payment.status,
        },
        StatusUpdate::NotFound => return Err(no_order()),
    };

    if order.status == OrderStatus::Approved {
        link_buyer_identity(conn, &order)?;
    }

    Ok(outcome)
}

/// Attach the buyer's existing identity to an approved order that has none.
/// Identities are never created here.
fn link_buyer_identity(conn: &Connection, order: &Order) -> Result<()> {
    if order.linked_identity_id.is_some() {
        return Ok(());
    }

    let identity = queries::get_identity_by_email(conn, &order.buyer_email)
        .map_err(|e| reconciliation_error("resolving buyer identity", e))?;

    match identity {
        Some(identity) => {
            if queries::link_order_identity(conn, &order.id, &identity.id)
                .map_err(|e| reconciliation_error("linking buyer identity", e))?
            {
                tracing::info!("Order {} linked to identity {}", order.id, identity.id);
            }
        }
        None => tracing::debug!("Approved order {} has no identity for its buyer", order.id),
    }

    Ok(())
}

/// Totals from one stale order pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StaleReport {
    pub examined: usize,
    /// Orders that reached a terminal status in this pass.
    pub settled: usize,
    pub still_pending: usize,
    pub failed: usize,
}

/// Ask the processor about pending orders older than `older_than` and apply
/// whatever it reports. Covers notifications that never arrived.
/// One order failing never stops the pass.
pub async fn reconcile_stale_orders(state: &AppState, older_than: Duration) -> Result<StaleReport> {
    let cutoff = Utc::now().timestamp() - older_than.as_secs() as i64;
    let orders = {
        let conn = state.db.get()?;
        queries::list_stale_pending_orders(&conn, cutoff, STALE_BATCH_LIMIT)?
    };

    let mut report = StaleReport {
        examined: orders.len(),
        ..Default::default()
    };

    for order in orders {
        let payment = match state.gateway.find_payment_by_external_reference(&order.id).await {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                report.still_pending += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!("Stale pass: lookup failed for order {}: {}", order.id, e);
                report.failed += 1;
                continue;
            }
        };

        let result = state
            .db
            .get()
            .map_err(AppError::from)
            .and_then(|mut conn| apply_payment(&mut conn, &payment));

        match result {
            Ok(ReconcileOutcome::Applied { status, .. }) if status.is_terminal() => report.settled += 1,
            Ok(_) => report.still_pending += 1,
            Err(e) => {
                tracing::warn!("Stale pass: could not apply payment for order {}: {}", order.id, e);
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        "Stale pass done: examined={}, settled={}, still_pending={}, failed={}",
        report.examined,
        report.settled,
        report.still_pending,
        report.failed
    );

    Ok(report)
}
