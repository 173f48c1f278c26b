use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::identity::federated::GOOGLE_TOKENINFO_URL;

pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_TOKENINFO_URL: &str = "google-tokeninfo-url";
pub const ARG_GOOGLE_TIMEOUT_SECONDS: &str = "google-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub client_ids: Vec<String>,
    pub tokeninfo_url: String,
    pub timeout_seconds: u64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let client_ids = matches
            .get_many::<String>(ARG_GOOGLE_CLIENT_ID)
            .map(|values| {
                values
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            client_ids,
            tokeninfo_url: matches
                .get_one::<String>(ARG_GOOGLE_TOKENINFO_URL)
                .cloned()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| GOOGLE_TOKENINFO_URL.to_string()),
            timeout_seconds: matches
                .get_one::<u64>(ARG_GOOGLE_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(5),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Accepted Google OAuth client ids (audience); repeat or comma separate")
                .env("ENTRECORE_GOOGLE_CLIENT_ID")
                .action(ArgAction::Append)
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_GOOGLE_TOKENINFO_URL)
                .long(ARG_GOOGLE_TOKENINFO_URL)
                .help("Google tokeninfo endpoint used to verify ID tokens")
                .env("ENTRECORE_GOOGLE_TOKENINFO_URL")
                .default_value(GOOGLE_TOKENINFO_URL),
        )
        .arg(
            Arg::new(ARG_GOOGLE_TIMEOUT_SECONDS)
                .long(ARG_GOOGLE_TIMEOUT_SECONDS)
                .help("Timeout for Google token verification, in seconds")
                .env("ENTRECORE_GOOGLE_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
