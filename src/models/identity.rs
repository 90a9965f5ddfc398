use serde::{Deserialize, Serialize};

/// A buyer account. One per (normalized) email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreateIdentity {
    pub email: String,
    pub password_hash: String,
}
