use crate::{
    api::{self, AppState},
    cli::commands::{auth, google},
    db,
    identity::{
        Clock, CredentialHasher, GoogleVerifier, GoogleVerifierConfig, IdentityBackends,
        IdentityConfig, IdentityService, InMemoryRevocationRegistry, InMemorySignupStore,
        InMemoryUserStore, PgUserStore, SystemClock, TokenCodec, UserStore,
    },
};
use anyhow::{Context, Result};
use chrono::TimeDelta;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub db_connect_attempts: u32,
    pub db_connect_backoff: Duration,
    pub auth: auth::Options,
    pub google: google::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing key is unusable, the database cannot be
/// reached, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let codec = TokenCodec::new(&args.auth.jwt_secret, args.auth.jwt_algorithm, clock.clone())
        .context("invalid token signing configuration")?;

    let users = user_store(&args).await?;

    let verifier = GoogleVerifier::new(
        GoogleVerifierConfig::new(&args.google.tokeninfo_url)
            .context("invalid --google-tokeninfo-url")?
            .with_client_ids(args.google.client_ids.clone())
            .with_timeout(Duration::from_secs(args.google.timeout_seconds)),
    )
    .context("failed to build Google verifier HTTP client")?;

    if args.google.client_ids.is_empty() {
        warn!("no --google-client-id configured, Google tokens for any audience are accepted");
    }

    let backends = IdentityBackends {
        users,
        revocations: Arc::new(InMemoryRevocationRegistry::new(clock.clone())),
        signups: Arc::new(
            InMemorySignupStore::new(clock.clone())
                .with_ttl(TimeDelta::seconds(args.auth.signup_session_ttl_seconds)),
        ),
        federated: Arc::new(verifier),
    };

    let config = IdentityConfig::new()
        .with_access_token_ttl_minutes(args.auth.access_token_ttl_minutes)
        .with_refresh_token_ttl_days(args.auth.refresh_token_ttl_days)
        .with_missing_signup_policy(args.auth.missing_signup_policy);

    let service = IdentityService::new(
        config,
        codec,
        CredentialHasher::default(),
        backends,
        clock,
    );

    if args.auth.expose_reset_token {
        warn!("password reset tokens are returned in API responses; do not use in production");
    }

    let state = AppState::new(Arc::new(service))
        .with_expose_reset_token(args.auth.expose_reset_token);

    api::serve(
        args.port,
        state,
        Duration::from_secs(args.auth.revocation_sweep_seconds),
    )
    .await
}

async fn user_store(args: &Args) -> Result<Arc<dyn UserStore>> {
    let Some(dsn) = args.dsn.as_deref() else {
        warn!("no --dsn configured, accounts are kept in memory and lost on restart");
        return Ok(Arc::new(InMemoryUserStore::new()));
    };

    let pool =
        db::connect_with_retry(dsn, args.db_connect_attempts, args.db_connect_backoff).await?;
    let store = PgUserStore::new(pool);
    store
        .ensure_schema()
        .await
        .context("failed to apply database schema")?;

    Ok(Arc::new(store))
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "store",
            args.dsn
                .as_deref()
                .map_or_else(|| "memory".to_string(), redact_dsn),
        ),
        ("jwt_algorithm", args.auth.jwt_algorithm.to_string()),
        (
            "access_token_ttl",
            format!("{}m", args.auth.access_token_ttl_minutes),
        ),
        (
            "refresh_token_ttl",
            format!("{}d", args.auth.refresh_token_ttl_days),
        ),
        (
            "signup_session_ttl",
            format!("{}s", args.auth.signup_session_ttl_seconds),
        ),
        (
            "missing_signup_policy",
            args.auth.missing_signup_policy.to_string(),
        ),
        (
            "google_client_ids",
            args.google.client_ids.len().to_string(),
        ),
        ("google_tokeninfo_url", args.google.tokeninfo_url.clone()),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\n{title}:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    hash.trim().chars().take(7).collect()
}
