//! Input normalization and validation rules shared by the identity operations.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};
use regex::Regex;

use super::error::IdentityError;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 150;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Optional leading `+`, then 10 to 15 digits.
pub(crate) fn valid_phone(phone: &str) -> bool {
    Regex::new(r"^\+?\d{10,15}$").is_ok_and(|regex| regex.is_match(phone))
}

pub(crate) fn check_password_strength(password: &str) -> Result<(), IdentityError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(IdentityError::WeakPassword(
            "must be at least 8 characters long",
        ));
    }
    if !password.chars().any(char::is_lowercase) {
        return Err(IdentityError::WeakPassword(
            "must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(char::is_uppercase) {
        return Err(IdentityError::WeakPassword(
            "must contain at least one uppercase letter",
        ));
    }
    if !password
        .chars()
        .any(|c| c.is_ascii_digit() || c.is_ascii_punctuation())
    {
        return Err(IdentityError::WeakPassword(
            "must contain at least one digit or symbol",
        ));
    }
    Ok(())
}

/// Username for a new federated account: the sanitized email local part, or
/// `google_{federated_id}` when nothing usable is left.
pub(crate) fn federated_username(email: &str, federated_id: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let sanitized: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'))
        .take(MAX_USERNAME_LEN)
        .collect::<String>()
        .to_lowercase();

    if sanitized.chars().any(|c| c.is_ascii_alphanumeric()) {
        sanitized
    } else {
        format!("google_{federated_id}")
    }
}

/// Create a new single-use token for email verification links.
pub(crate) fn generate_verification_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate verification token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}
