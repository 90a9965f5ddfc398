//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! Models implement `FromRow` to define how they are built from a row; the
//! `query_one` / `query_all` helpers take care of the rest.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// Invalid stored values surface as a column type error instead of a panic.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse a JSON text column.
fn parse_json<T: serde::de::DeserializeOwned>(row: &Row, col: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(col)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e)))
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const ORDER_COLS: &str = "id, buyer_email, line_items, total_cents, status, payment_reference, linked_identity_id, created_at, updated_at";

pub const IDENTITY_COLS: &str = "id, email, password_hash, created_at";

pub const DOWNLOAD_LOG_COLS: &str = "id, identity_id, product_name, source_address, created_at";

// ============ FromRow Implementations ============

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            buyer_email: row.get(1)?,
            line_items: parse_json(row, 2)?,
            total_cents: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            payment_reference: row.get(5)?,
            linked_identity_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for Identity {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Identity {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

impl FromRow for DownloadLogEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(DownloadLogEntry {
            id: row.get(0)?,
            identity_id: row.get(1)?,
            product_name: row.get(2)?,
            source_address: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}
