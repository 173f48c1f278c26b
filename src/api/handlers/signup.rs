//! Two-step password signup.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use super::types::{SetPasswordRequest, SignupRequest, UserResponse};
use crate::api::{AppState, error::ApiError, error::ErrorBody};
use crate::identity::SignupAck;

#[utoipa::path(
    post,
    path = "/api/v1/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Profile stored until a password is set", body = SignupAck),
        (status = 400, description = "Invalid email or phone number", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    ),
    tag = "signup"
)]
pub async fn begin_signup(
    state: Extension<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;

    let ack = state
        .identity()
        .begin_signup(
            &request.first_name,
            &request.last_name,
            &request.email,
            request.phone_number.as_deref(),
        )
        .await?;

    Ok(Json(ack))
}

#[utoipa::path(
    post,
    path = "/api/v1/signup/set-password",
    request_body = SetPasswordRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid email, mismatched or weak password", body = ErrorBody),
        (status = 404, description = "Signup was not started for this email", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    ),
    tag = "signup"
)]
pub async fn set_password(
    state: Extension<AppState>,
    payload: Result<Json<SetPasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;

    let user = state
        .identity()
        .complete_signup(
            &request.email,
            &request.password,
            &request.confirm_password,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}
