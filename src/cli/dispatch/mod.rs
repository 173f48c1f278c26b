use crate::cli::{
    actions::{Action, server::Args},
    commands::{self, auth, google},
};
use anyhow::Result;
use std::time::Duration;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(commands::ARG_DSN)
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty());
    let db_connect_attempts = matches
        .get_one::<u32>(commands::ARG_DB_CONNECT_ATTEMPTS)
        .copied()
        .unwrap_or(5);
    let db_connect_backoff = Duration::from_secs(
        matches
            .get_one::<u64>(commands::ARG_DB_CONNECT_BACKOFF_SECONDS)
            .copied()
            .unwrap_or(1),
    );

    Ok(Action::Server(Args {
        port,
        dsn,
        db_connect_attempts,
        db_connect_backoff,
        auth: auth::Options::parse(matches)?,
        google: google::Options::parse(matches),
    }))
}
