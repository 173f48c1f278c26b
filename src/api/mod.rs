//! HTTP surface: router, middleware and server lifecycle.

use crate::{cli::telemetry::shutdown_tracer, identity::IdentityService};
use anyhow::Result;
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::options,
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal, task::JoinHandle, time::MissedTickBehavior};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, debug, error, info, info_span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub mod error;
pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    identity: Arc<IdentityService>,
    expose_reset_token: bool,
}

impl AppState {
    #[must_use]
    pub fn new(identity: Arc<IdentityService>) -> Self {
        Self {
            identity,
            expose_reset_token: false,
        }
    }

    /// Echo password reset tokens in responses. Development only.
    #[must_use]
    pub fn with_expose_reset_token(mut self, expose: bool) -> Self {
        self.expose_reset_token = expose;
        self
    }

    #[must_use]
    pub fn identity(&self) -> &Arc<IdentityService> {
        &self.identity
    }

    #[must_use]
    pub fn expose_reset_token(&self) -> bool {
        self.expose_reset_token
    }
}

#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// The served application: documented routes plus middleware and state.
#[must_use]
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_origin(Any);

    let (router, _openapi) = router().split_for_parts();
    router
        .route("/api/v1/health", options(handlers::health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        )
}

/// Serve until SIGINT/SIGTERM, sweeping expired session state in the background.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(port: u16, state: AppState, sweep_every: Duration) -> Result<()> {
    let sweeper = spawn_sweeper(state.identity().clone(), sweep_every);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    let result = axum::serve(listener, app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    shutdown_tracer();

    result?;
    Ok(())
}

/// Periodically purge expired revocations and stale signup sessions.
pub fn spawn_sweeper(identity: Arc<IdentityService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let (revocations, signups) = identity.sweep().await;
            debug!(revocations, signups, "purged expired session state");
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl_c signal received"),
        () = terminate => info!("terminate signal received"),
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
