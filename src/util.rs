//! Input validation shared by the order and identity handlers.

use axum::http::HeaderMap;

use crate::error::{AppError, Result, msg};

pub const MIN_PASSWORD_LEN: usize = 6;
const MAX_EMAIL_LEN: usize = 254;

/// Lightweight structural check: one `@`, non-empty local part, dotted domain,
/// no whitespace. Deliverability is the processor's problem.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

pub fn validate_email(email: &str) -> Result<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(AppError::BadRequest(msg::INVALID_EMAIL.into()))
    }
}

/// Strip punctuation and validate both CPF check digits.
/// Returns the 11-digit form on success.
pub fn normalize_cpf(cpf: &str) -> Result<String> {
    let digits: Vec<u32> = cpf
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | ' '))
        .map(|c| c.to_digit(10))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| AppError::BadRequest(msg::INVALID_CPF.into()))?;

    if digits.len() != 11 || digits.iter().all(|d| *d == digits[0]) {
        return Err(AppError::BadRequest(msg::INVALID_CPF.into()));
    }

    let check_digit = |len: usize| -> u32 {
        let sum: u32 = digits[..len]
            .iter()
            .enumerate()
            .map(|(i, d)| d * (len as u32 + 1 - i as u32))
            .sum();
        let rest = (sum * 10) % 11;
        if rest == 10 { 0 } else { rest }
    };

    if check_digit(9) != digits[9] || check_digit(10) != digits[10] {
        return Err(AppError::BadRequest(msg::INVALID_CPF.into()));
    }

    Ok(digits.iter().map(|d| char::from_digit(*d, 10).unwrap_or('0')).collect())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(msg::PASSWORD_TOO_SHORT.into()));
    }
    Ok(())
}

/// Token from an `Authorization: Bearer ...` header, if present and non-empty.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}
