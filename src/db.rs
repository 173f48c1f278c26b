//! PostgreSQL pool setup.

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Connect to the database, retrying with exponential backoff.
///
/// # Errors
/// Returns the last connection error once `attempts` tries have failed.
#[instrument(skip(dsn))]
pub async fn connect_with_retry(dsn: &str, attempts: u32, base_backoff: Duration) -> Result<PgPool> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = backoff_delay(base_backoff, attempt - 1);
            warn!("Backing off for {} ms", delay.as_millis());
            sleep(delay).await;
        }

        match PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .acquire_timeout(Duration::from_secs(5))
            .test_before_acquire(true)
            .connect(dsn)
            .await
        {
            Ok(pool) => {
                info!(attempt, "connected to database");
                return Ok(pool);
            }
            Err(err) => {
                warn!(attempt, attempts, "database connection failed: {err}");
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(err) => {
            Err(err).context(format!("failed to connect to database after {attempts} attempts"))
        }
        None => Err(anyhow!("failed to connect to database")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 4), Duration::from_secs(8));
    }

    #[test]
    fn backoff_saturates() {
        let delay = backoff_delay(Duration::from_secs(u64::MAX / 2), 10);
        assert_eq!(delay, Duration::MAX);
    }

    #[tokio::test]
    async fn gives_up_after_last_attempt() {
        let result = connect_with_retry(
            "postgres://entrecore@127.0.0.1:1/entrecore",
            2,
            Duration::from_millis(10),
        )
        .await;

        let err = result.err().map(|err| err.to_string()).unwrap_or_default();
        assert!(err.contains("after 2 attempts"), "unexpected error: {err}");
    }
}
