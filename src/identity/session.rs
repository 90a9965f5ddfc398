use jwt_simple::prelude::*;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{AppError, Result};
use crate::models::Identity;

const ISSUER: &str = "storefront";

/// Custom claims carried by a session token. The identity id is the JWT subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub email: String,
}

/// Returned to the client so it can proceed without a separate login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Debug, Clone)]
pub struct VerifiedSession {
    pub identity_id: String,
    pub email: String,
}

/// Issues and verifies HS256 session tokens.
#[derive(Clone)]
pub struct SessionSigner {
    key: HS256Key,
    ttl_secs: u64,
}

/// 32 random bytes, for dev mode and tests.
pub fn generate_session_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    OsRng.fill_bytes(&mut secret);
    secret
}

impl SessionSigner {
    pub fn new(secret: &[u8], ttl_hours: u64) -> Self {
        Self {
            key: HS256Key::from_bytes(secret),
            ttl_secs: ttl_hours.max(1) * 3600,
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<SessionTokens> {
        let claims = Claims::with_custom_claims(
            SessionClaims {
                email: identity.email.clone(),
            },
            Duration::from_secs(self.ttl_secs),
        )
        .with_issuer(ISSUER)
        .with_subject(&identity.id);

        let access_token = self
            .key
            .authenticate(claims)
            .map_err(|e| AppError::Internal(format!("Failed to sign session token: {}", e)))?;

        Ok(SessionTokens {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.ttl_secs,
        })
    }

    /// Any failure (bad signature, expired, wrong issuer, no subject) is `Unauthorized`.
    pub fn verify(&self, token: &str) -> Result<VerifiedSession> {
        let options = VerificationOptions {
            allowed_issuers: Some(std::collections::HashSet::from([ISSUER.to_string()])),
            ..Default::default()
        };

        let claims = self
            .key
            .verify_token::<SessionClaims>(token, Some(options))
            .map_err(|e| {
                tracing::debug!("Session token rejected: {}", e);
                AppError::Unauthorized
            })?;

        let identity_id = claims.subject.ok_or(AppError::Unauthorized)?;

        Ok(VerifiedSession {
            identity_id,
            email: claims.custom.email,
        })
    }
}
