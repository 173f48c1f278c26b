use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, builder::BoolishValueParser};
use secrecy::SecretString;

use crate::identity::{MissingSignupPolicy, SigningAlgorithm};

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_ALGORITHM: &str = "jwt-algorithm";
pub const ARG_ACCESS_TOKEN_TTL_MINUTES: &str = "access-token-ttl-minutes";
pub const ARG_REFRESH_TOKEN_TTL_DAYS: &str = "refresh-token-ttl-days";
pub const ARG_SIGNUP_SESSION_TTL_SECONDS: &str = "signup-session-ttl-seconds";
pub const ARG_MISSING_SIGNUP_POLICY: &str = "missing-signup-policy";
pub const ARG_REVOCATION_SWEEP_SECONDS: &str = "revocation-sweep-seconds";
pub const ARG_EXPOSE_RESET_TOKEN: &str = "expose-reset-token";

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub jwt_algorithm: SigningAlgorithm,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub signup_session_ttl_seconds: i64,
    pub missing_signup_policy: MissingSignupPolicy,
    pub revocation_sweep_seconds: u64,
    pub expose_reset_token: bool,
}

impl Options {
    /// Parse token and session arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the secret is missing or a value cannot be parsed.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|secret| !secret.trim().is_empty())
            .cloned()
            .map(SecretString::from)
            .with_context(|| format!("missing required argument: --{ARG_JWT_SECRET}"))?;

        let jwt_algorithm = matches
            .get_one::<String>(ARG_JWT_ALGORITHM)
            .map_or(Ok(SigningAlgorithm::default()), |value| value.parse())
            .with_context(|| format!("invalid --{ARG_JWT_ALGORITHM}"))?;

        let missing_signup_policy = matches
            .get_one::<String>(ARG_MISSING_SIGNUP_POLICY)
            .map_or(Ok(MissingSignupPolicy::default()), |value| value.parse())
            .map_err(|err| anyhow::anyhow!(err))?;

        Ok(Self {
            jwt_secret,
            jwt_algorithm,
            access_token_ttl_minutes: matches
                .get_one::<i64>(ARG_ACCESS_TOKEN_TTL_MINUTES)
                .copied()
                .unwrap_or(30),
            refresh_token_ttl_days: matches
                .get_one::<i64>(ARG_REFRESH_TOKEN_TTL_DAYS)
                .copied()
                .unwrap_or(7),
            signup_session_ttl_seconds: matches
                .get_one::<i64>(ARG_SIGNUP_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(1800),
            missing_signup_policy,
            revocation_sweep_seconds: matches
                .get_one::<u64>(ARG_REVOCATION_SWEEP_SECONDS)
                .copied()
                .unwrap_or(300),
            expose_reset_token: matches.get_flag(ARG_EXPOSE_RESET_TOKEN),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_session_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign session tokens")
                .env("ENTRECORE_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_JWT_ALGORITHM)
                .long(ARG_JWT_ALGORITHM)
                .help("HMAC algorithm used to sign session tokens")
                .env("ENTRECORE_JWT_ALGORITHM")
                .default_value("HS256")
                .value_parser(["HS256", "HS384", "HS512"])
                .ignore_case(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_MINUTES)
                .long(ARG_ACCESS_TOKEN_TTL_MINUTES)
                .help("Access token lifetime in minutes")
                .env("ENTRECORE_ACCESS_TOKEN_TTL_MINUTES")
                .default_value("30")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_DAYS)
                .long(ARG_REFRESH_TOKEN_TTL_DAYS)
                .help("Refresh token lifetime in days")
                .env("ENTRECORE_REFRESH_TOKEN_TTL_DAYS")
                .default_value("7")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_EXPOSE_RESET_TOKEN)
                .long(ARG_EXPOSE_RESET_TOKEN)
                .help("Return password reset tokens in API responses (development only)")
                .env("ENTRECORE_EXPOSE_RESET_TOKEN")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGNUP_SESSION_TTL_SECONDS)
                .long(ARG_SIGNUP_SESSION_TTL_SECONDS)
                .help("How long a started signup waits for its password, in seconds")
                .env("ENTRECORE_SIGNUP_SESSION_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_MISSING_SIGNUP_POLICY)
                .long(ARG_MISSING_SIGNUP_POLICY)
                .help("What set-password does without a started signup")
                .env("ENTRECORE_MISSING_SIGNUP_POLICY")
                .default_value("reject")
                .value_parser(["reject", "default-profile"]),
        )
        .arg(
            Arg::new(ARG_REVOCATION_SWEEP_SECONDS)
                .long(ARG_REVOCATION_SWEEP_SECONDS)
                .help("Interval between purges of expired revocations and signup sessions")
                .env("ENTRECORE_REVOCATION_SWEEP_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
