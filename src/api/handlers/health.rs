use crate::{GIT_COMMIT_HASH, api::AppState};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DbCheck {
    status: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service is up", body = Health)
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(method: Method) -> impl IntoResponse {
    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let short_hash: String = health.commit.chars().take(7).collect();

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .unwrap_or_else(|err| {
            error!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        });

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    (StatusCode::OK, headers, body)
}

#[utoipa::path(
    get,
    path = "/api/v1/db-check",
    responses(
        (status = 200, description = "User store is reachable", body = DbCheck),
        (status = 503, description = "User store is unreachable", body = DbCheck)
    ),
    tag = "health"
)]
pub async fn db_check(state: Extension<AppState>) -> impl IntoResponse {
    match state.identity().ping_store().await {
        Ok(()) => (
            StatusCode::OK,
            Json(DbCheck {
                status: "ok".to_string(),
            }),
        ),
        Err(err) => {
            error!("User store check failed: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(DbCheck {
                    status: "error".to_string(),
                }),
            )
        }
    }
}
