//! Route handlers.
//!
//! Handlers only translate HTTP into [`crate::identity::IdentityService`]
//! calls; every decision lives in the service.

pub mod google;
pub mod health;
pub mod me;
pub mod password_reset;
pub mod session;
pub mod signup;
pub mod types;
pub mod verification;

use axum::{
    extract::rejection::{FormRejection, JsonRejection},
    http::{HeaderMap, header::AUTHORIZATION},
};

use super::error::ApiError;

/// Token from `Authorization: Bearer <token>`, if present and non-empty.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

pub(crate) fn require_bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    extract_bearer_token(headers).ok_or(ApiError::Unauthenticated)
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
