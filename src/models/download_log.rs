use serde::{Deserialize, Serialize};

/// Append-only record of a granted download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadLogEntry {
    pub id: i64,
    pub identity_id: String,
    pub product_name: String,
    pub source_address: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreateDownloadLog {
    pub identity_id: String,
    pub product_name: String,
    pub source_address: String,
}
