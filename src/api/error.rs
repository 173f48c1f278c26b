//! HTTP mapping for identity errors.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::identity::{ErrorKind, IdentityError};

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub detail: String,
}

#[derive(Debug)]
pub enum ApiError {
    Identity(IdentityError),
    BadRequest(String),
    /// Missing or unreadable bearer credentials.
    Unauthenticated,
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        Self::Identity(err)
    }
}

#[must_use]
pub fn status_for(err: &IdentityError) -> StatusCode {
    match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Upstream => {
            if matches!(err, IdentityError::VerificationTimeout) {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::BAD_GATEWAY
            }
        }
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Identity(IdentityError::Internal(err)) => {
                error!("request failed: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            Self::Identity(err) => (status_for(&err), err.to_string()),
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Not authenticated".to_string(),
            ),
        };

        let mut response = (status, Json(ErrorBody { detail })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(
            status_for(&IdentityError::WeakPassword("too short")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&IdentityError::EmailTaken), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&IdentityError::TokenRevoked),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&IdentityError::SignupNotStarted),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&IdentityError::FederatedUnavailable),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&IdentityError::VerificationTimeout),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn unauthorized_carries_bearer_challenge() {
        let response = ApiError::from(IdentityError::InvalidToken).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE),
            Some(&HeaderValue::from_static("Bearer"))
        );

        let response = ApiError::from(IdentityError::EmailTaken).into_response();
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn internal_errors_are_not_leaked() {
        let err = IdentityError::Internal(anyhow::anyhow!("connection refused to 10.0.0.5"));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
