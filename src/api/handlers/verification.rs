use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    response::IntoResponse,
};
use tracing::debug;

use super::types::{MessageResponse, TokenRequest};
use crate::api::{AppState, error::ApiError, error::ErrorBody};

const VERIFIED_MESSAGE: &str = "Email verified successfully";

/// Consume an email verification token.
#[utoipa::path(
    post,
    path = "/api/v1/verify-email",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 404, description = "Unknown or already used token", body = ErrorBody)
    ),
    tag = "signup"
)]
pub async fn verify_email(
    state: Extension<AppState>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;

    let user = state.identity().verify_email(&request.token).await?;
    debug!(user_id = %user.id, "email verified");

    Ok(Json(MessageResponse::new(VERIFIED_MESSAGE)))
}
