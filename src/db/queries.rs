use chrono::Utc;
use rusqlite::{Connection, ErrorCode, TransactionBehavior, params};
use uuid::Uuid;

use crate::error::{AppError, Result, msg};
use crate::models::*;

use super::from_row::{DOWNLOAD_LOG_COLS, IDENTITY_COLS, ORDER_COLS, query_all, query_one};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Canonical form used for every email comparison and unique index.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ============ Identities ============

/// Insert a new identity. A concurrent insert for the same email loses the
/// UNIQUE race and comes back as `AlreadyExists`.
pub fn create_identity(conn: &Connection, input: &CreateIdentity) -> Result<Identity> {
    let id = gen_id();
    let now = now();
    let email = normalize_email(&input.email);

    conn.execute(
        "INSERT INTO identities (id, email, password_hash, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![&id, &email, &input.password_hash, now],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::AlreadyExists(msg::ACCOUNT_EXISTS.into())
        } else {
            e.into()
        }
    })?;

    Ok(Identity {
        id,
        email,
        password_hash: input.password_hash.clone(),
        created_at: now,
    })
}

pub fn get_identity_by_id(conn: &Connection, id: &str) -> Result<Option<Identity>> {
    query_one(
        conn,
        &format!("SELECT {} FROM identities WHERE id = ?1", IDENTITY_COLS),
        &[&id],
    )
}

pub fn get_identity_by_email(conn: &Connection, email: &str) -> Result<Option<Identity>> {
    let email = normalize_email(email);
    query_one(
        conn,
        &format!("SELECT {} FROM identities WHERE email = ?1", IDENTITY_COLS),
        &[&email],
    )
}

pub fn count_identities_by_email(conn: &Connection, email: &str) -> Result<i64> {
    let email = normalize_email(email);
    conn.query_row(
        "SELECT COUNT(*) FROM identities WHERE email = ?1",
        params![&email],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

// ============ Orders ============

/// Insert a new order in `pending`. Single statement, so the row either
/// exists completely or not at all.
pub fn create_order(conn: &Connection, input: &CreateOrder) -> Result<Order> {
    let id = gen_id();
    let now = now();
    let email = normalize_email(&input.buyer_email);
    let line_items = serde_json::to_string(&input.line_items)?;

    conn.execute(
        "INSERT INTO orders (id, buyer_email, line_items, total_cents, status, linked_identity_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            &email,
            &line_items,
            input.total_cents,
            OrderStatus::Pending.as_str(),
            &input.linked_identity_id,
            now,
            now
        ],
    )?;

    Ok(Order {
        id,
        buyer_email: email,
        line_items: input.line_items.clone(),
        total_cents: input.total_cents,
        status: OrderStatus::Pending,
        payment_reference: None,
        linked_identity_id: input.linked_identity_id.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_order_by_id(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )
}

/// Look up an order by its own id or by the processor's reference.
/// An id match wins if both happen to exist.
pub fn get_order_by_external_reference(conn: &Connection, reference: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE id = ?1 OR payment_reference = ?1
             ORDER BY (id = ?1) DESC LIMIT 1",
            ORDER_COLS
        ),
        &[&reference],
    )
}

/// All orders linked to an identity, newest first.
pub fn get_orders_for_identity(conn: &Connection, identity_id: &str) -> Result<Vec<Order>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE linked_identity_id = ?1
             ORDER BY created_at DESC, rowid DESC",
            ORDER_COLS
        ),
        &[&identity_id],
    )
}

/// Record the processor's reference on an order that is still pending.
pub fn set_order_payment_reference(conn: &Connection, order_id: &str, reference: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET payment_reference = ?1, updated_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        params![reference, now(), order_id],
    )?;
    Ok(affected > 0)
}

/// Link an identity to an order. The first link wins; later calls are no-ops.
pub fn link_order_identity(conn: &Connection, order_id: &str, identity_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET linked_identity_id = ?1, updated_at = ?2
         WHERE id = ?3 AND linked_identity_id IS NULL",
        params![identity_id, now(), order_id],
    )?;
    Ok(affected > 0)
}

/// Apply a status to the order matching `key` (order id or payment reference).
///
/// Terminal statuses are final: the same status again is `Unchanged`, a
/// different one is `Rejected` and nothing is written. A pending order accepts
/// any status and records `payment_reference` when given.
pub fn update_order_status(
    conn: &mut Connection,
    key: &str,
    new_status: OrderStatus,
    payment_reference: Option<&str>,
) -> Result<StatusUpdate> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(order) = get_order_by_external_reference(&tx, key)? else {
        return Ok(StatusUpdate::NotFound);
    };

    if order.status.is_terminal() {
        if order.status == new_status {
            return Ok(StatusUpdate::Unchanged);
        }
        tracing::warn!(
            "Ignoring status change for order {}: {} -> {} (terminal)",
            order.id,
            order.status,
            new_status
        );
        return Ok(StatusUpdate::Rejected {
            current: order.status,
        });
    }

    let reference_changes =
        payment_reference.is_some_and(|r| order.payment_reference.as_deref() != Some(r));
    if new_status == OrderStatus::Pending && !reference_changes {
        return Ok(StatusUpdate::Unchanged);
    }

    tx.execute(
        "UPDATE orders SET status = ?1, payment_reference = COALESCE(?2, payment_reference), updated_at = ?3
         WHERE id = ?4 AND status = 'pending'",
        params![new_status.as_str(), payment_reference, now(), &order.id],
    )?;
    tx.commit()?;

    tracing::info!(
        "Order {} status {} -> {} (reference={:?})",
        order.id,
        order.status,
        new_status,
        payment_reference
    );

    Ok(StatusUpdate::Applied {
        previous: order.status,
    })
}

/// Pending orders created at or before `created_before` (unix seconds), oldest first.
pub fn list_stale_pending_orders(conn: &Connection, created_before: i64, limit: i64) -> Result<Vec<Order>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE status = 'pending' AND created_at <= ?1
             ORDER BY created_at ASC LIMIT ?2",
            ORDER_COLS
        ),
        &[&created_before, &limit],
    )
}

pub fn count_orders(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
        .map_err(Into::into)
}

// ============ Download log (audit database) ============

pub fn create_download_log(conn: &Connection, input: &CreateDownloadLog) -> Result<DownloadLogEntry> {
    let now = now();
    conn.execute(
        "INSERT INTO download_logs (identity_id, product_name, source_address, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![&input.identity_id, &input.product_name, &input.source_address, now],
    )?;

    Ok(DownloadLogEntry {
        id: conn.last_insert_rowid(),
        identity_id: input.identity_id.clone(),
        product_name: input.product_name.clone(),
        source_address: input.source_address.clone(),
        created_at: now,
    })
}

pub fn list_download_logs_for_identity(conn: &Connection, identity_id: &str) -> Result<Vec<DownloadLogEntry>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM download_logs WHERE identity_id = ?1 ORDER BY id DESC",
            DOWNLOAD_LOG_COLS
        ),
        &[&identity_id],
    )
}
