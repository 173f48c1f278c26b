use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    response::IntoResponse,
};

use super::types::{GoogleAuthResponse, TokenRequest, UserResponse};
use crate::api::{AppState, error::ApiError, error::ErrorBody};
use crate::identity::service::TOKEN_TYPE;

/// Sign in (or sign up) with a Google ID token.
#[utoipa::path(
    post,
    path = "/api/v1/signup/google",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Signed in", body = GoogleAuthResponse),
        (status = 401, description = "Google token rejected or account disabled", body = ErrorBody),
        (status = 409, description = "Google account already linked elsewhere", body = ErrorBody),
        (status = 502, description = "Google unavailable", body = ErrorBody),
        (status = 504, description = "Google verification timed out", body = ErrorBody)
    ),
    tag = "signup"
)]
pub async fn google_auth(
    state: Extension<AppState>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;

    let login = state.identity().google_auth(&request.token).await?;

    Ok(Json(GoogleAuthResponse {
        access_token: login.access_token,
        token_type: TOKEN_TYPE.to_string(),
        expires_at: login.expires_at,
        user: UserResponse::from(&login.user),
    }))
}
