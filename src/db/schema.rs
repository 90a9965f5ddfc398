use rusqlite::Connection;

/// Initialize the main database schema (everything except the download log)
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Buyer accounts. Email is stored trimmed and lowercased.
        CREATE TABLE IF NOT EXISTS identities (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- One row per checkout attempt. Rows are never deleted.
        -- line_items is a JSON snapshot of catalog entries at creation time.
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            buyer_email TEXT NOT NULL,
            line_items TEXT NOT NULL,
            total_cents INTEGER NOT NULL CHECK (total_cents >= 0),
            status TEXT NOT NULL CHECK (status IN ('pending', 'approved', 'rejected', 'cancelled')),
            payment_reference TEXT,
            linked_identity_id TEXT REFERENCES identities(id),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_payment_reference
            ON orders(payment_reference) WHERE payment_reference IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_orders_identity ON orders(linked_identity_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_orders_pending ON orders(created_at) WHERE status = 'pending';
        CREATE INDEX IF NOT EXISTS idx_orders_buyer_email ON orders(buyer_email);
        "#,
    )
}

/// Initialize the audit database schema
pub fn init_audit_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Append-only; this service never updates or deletes rows here.
        CREATE TABLE IF NOT EXISTS download_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identity_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            source_address TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_download_logs_identity ON download_logs(identity_id, created_at);
        "#,
    )
}
