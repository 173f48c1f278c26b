//! Password reset request and confirmation.
//!
//! The request endpoint answers the same way whether or not the email exists.
//! The reset token itself is only echoed back when the server runs with
//! `--expose-reset-token`; otherwise it is meant for an out-of-band channel.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    response::IntoResponse,
};

use super::types::{MessageResponse, PasswordResetConfirm, PasswordResetRequest, PasswordResetResponse};
use crate::api::{AppState, error::ApiError, error::ErrorBody};

const PASSWORD_UPDATED_MESSAGE: &str = "Password updated successfully";

#[utoipa::path(
    post,
    path = "/api/v1/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Accepted, whether or not the email is registered", body = PasswordResetResponse)
    ),
    tag = "password"
)]
pub async fn request_reset(
    state: Extension<AppState>,
    payload: Result<Json<PasswordResetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;

    let ack = state
        .identity()
        .request_password_reset(&request.email)
        .await?;

    let reset_token = if state.expose_reset_token() {
        ack.reset_token
    } else {
        None
    };

    Ok(Json(PasswordResetResponse {
        message: ack.message,
        reset_token,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/password-reset/confirm",
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "Password replaced", body = MessageResponse),
        (status = 400, description = "Mismatched or weak password", body = ErrorBody),
        (status = 401, description = "Invalid, expired, used or wrong-purpose token", body = ErrorBody),
        (status = 404, description = "Account no longer exists", body = ErrorBody)
    ),
    tag = "password"
)]
pub async fn confirm_reset(
    state: Extension<AppState>,
    payload: Result<Json<PasswordResetConfirm>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;

    state
        .identity()
        .confirm_password_reset(
            &request.token,
            &request.new_password,
            &request.confirm_password,
        )
        .await?;

    Ok(Json(MessageResponse::new(PASSWORD_UPDATED_MESSAGE)))
}
