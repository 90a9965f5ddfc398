//! Buyer accounts: create-or-resolve on purchase, login, and session tokens.

mod password;
mod session;

pub use password::{hash_password, verify_password};
pub use session::{
    SessionClaims, SessionSigner, SessionTokens, VerifiedSession, generate_session_secret,
};

use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result, msg};
use crate::models::{CreateIdentity, Identity};
use crate::util::validate_password;

#[derive(Debug, Clone)]
pub struct Provisioned {
    pub identity: Identity,
    pub created: bool,
}

/// Create or resolve the identity for `email`.
///
/// - password given, identity exists: `AlreadyExists` (the buyer should log in).
/// - password given, none exists: create it.
/// - no password, identity exists: resolve it (repeat purchase).
/// - no password, none exists: `NotFound`.
pub fn provision_or_resolve(conn: &Connection, email: &str, password: Option<&str>) -> Result<Provisioned> {
    let existing = queries::get_identity_by_email(conn, email)?;

    match (existing, password) {
        (Some(_), Some(_)) => Err(AppError::AlreadyExists(msg::ACCOUNT_EXISTS.into())),
        (Some(identity), None) => Ok(Provisioned {
            identity,
            created: false,
        }),
        (None, Some(password)) => {
            validate_password(password)?;
            let identity = queries::create_identity(
                conn,
                &CreateIdentity {
                    email: email.to_string(),
                    password_hash: hash_password(password)?,
                },
            )?;
            tracing::info!("Identity created: id={}, email={}", identity.id, identity.email);
            Ok(Provisioned {
                identity,
                created: true,
            })
        }
        (None, None) => Err(AppError::NotFound(msg::IDENTITY_NOT_FOUND.into())),
    }
}

pub fn identity_exists(conn: &Connection, email: &str) -> Result<bool> {
    Ok(queries::get_identity_by_email(conn, email)?.is_some())
}

/// Verify credentials. Unknown email and wrong password look the same to the caller.
pub fn authenticate(conn: &Connection, email: &str, password: &str) -> Result<Identity> {
    let identity = queries::get_identity_by_email(conn, email)?.ok_or(AppError::Unauthorized)?;
    if verify_password(password, &identity.password_hash) {
        Ok(identity)
    } else {
        Err(AppError::Unauthorized)
    }
}
