use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::HeaderMap,
    response::IntoResponse,
};

use super::require_bearer_token;
use super::types::UserResponse;
use crate::api::{AppState, error::ApiError, error::ErrorBody};
use crate::identity::ProfileUpdate;

#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "The authenticated account", body = UserResponse),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorBody),
        (status = 404, description = "Account no longer exists", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_me(
    state: Extension<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = require_bearer_token(&headers)?;
    let user = state.identity().resolve(&token).await?;

    Ok(Json(UserResponse::from(&user)))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/me",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Updated account", body = UserResponse),
        (status = 400, description = "Invalid email or phone number", body = ErrorBody),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_me(
    state: Extension<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let token = require_bearer_token(&headers)?;
    let Json(update) = payload?;

    let user = state.identity().resolve(&token).await?;
    let user = state.identity().update_profile(user.id, update).await?;

    Ok(Json(UserResponse::from(&user)))
}
