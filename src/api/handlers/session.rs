//! Token issuance, refresh and logout.

use axum::{
    Form, Json,
    extract::{Extension, Query, rejection::FormRejection},
    http::HeaderMap,
    response::IntoResponse,
};

use super::require_bearer_token;
use super::types::{LoginForm, MessageResponse, TokenQuery, TokenRequest};
use crate::api::{AppState, error::ApiError, error::ErrorBody};
use crate::identity::TokenPair;

const LOGGED_OUT_MESSAGE: &str = "Successfully logged out";

/// Exchange a username (or email) and password for a token pair.
#[utoipa::path(
    post,
    path = "/api/v1/token",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access and refresh tokens", body = TokenPair),
        (status = 401, description = "Incorrect credentials or disabled account", body = ErrorBody)
    ),
    tag = "session"
)]
pub async fn login(
    state: Extension<AppState>,
    payload: Result<Form<LoginForm>, FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Form(form) = payload?;

    let pair = state.identity().login(&form.username, &form.password).await?;

    Ok(Json(pair))
}

/// Mint a new access token. The refresh token is read from the JSON body or
/// the `token` query parameter.
#[utoipa::path(
    post,
    path = "/api/v1/refresh-token",
    request_body(content = TokenRequest, description = "Refresh token, unless passed as ?token="),
    params(
        ("token" = Option<String>, Query, description = "Refresh token")
    ),
    responses(
        (status = 200, description = "New access token; the refresh token is returned unchanged", body = TokenPair),
        (status = 400, description = "No refresh token supplied", body = ErrorBody),
        (status = 401, description = "Invalid, expired, revoked or non-refresh token", body = ErrorBody)
    ),
    tag = "session"
)]
pub async fn refresh(
    state: Extension<AppState>,
    Query(query): Query<TokenQuery>,
    payload: Option<Json<TokenRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let token = payload
        .map(|Json(request)| request.token)
        .or(query.token)
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Refresh token is required".to_string()))?;

    let pair = state.identity().refresh(&token).await?;

    Ok(Json(pair))
}

/// Revoke the presented bearer token.
#[utoipa::path(
    post,
    path = "/api/v1/logout",
    responses(
        (status = 200, description = "Token revoked", body = MessageResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "session"
)]
pub async fn logout(
    state: Extension<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = require_bearer_token(&headers)?;

    state.identity().logout(&token).await?;

    Ok(Json(MessageResponse::new(LOGGED_OUT_MESSAGE)))
}
