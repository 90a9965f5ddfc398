mod from_row;
pub mod queries;
mod schema;

pub use schema::{init_audit_db, init_db};

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::identity::SessionSigner;
use crate::payments::PaymentGateway;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (orders, identities)
    pub db: DbPool,
    /// Audit database pool (download log, kept in its own file)
    pub audit: DbPool,
    /// Base URL for processor callbacks (e.g., https://loja.example.com)
    pub base_url: String,
    /// Prefix for download links handed out after an access grant
    pub download_base_url: String,
    pub gateway: Arc<dyn PaymentGateway>,
    pub sessions: SessionSigner,
}

pub fn create_pool(database_path: &str, timeout: Duration) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|c| c.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;"));
    Pool::builder()
        .max_size(10)
        .connection_timeout(timeout)
        .build(manager)
}
