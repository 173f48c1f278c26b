pub mod auth;
pub mod google;
pub mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_DB_CONNECT_ATTEMPTS: &str = "db-connect-attempts";
pub const ARG_DB_CONNECT_BACKOFF_SECONDS: &str = "db-connect-backoff-seconds";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("entrecore-auth")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("ENTRECORE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "Database connection string. When omitted, accounts are kept in memory and lost on restart.",
                )
                .env("ENTRECORE_DSN"),
        )
        .arg(
            Arg::new(ARG_DB_CONNECT_ATTEMPTS)
                .long(ARG_DB_CONNECT_ATTEMPTS)
                .help("Database connection attempts before giving up")
                .default_value("5")
                .env("ENTRECORE_DB_CONNECT_ATTEMPTS")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_DB_CONNECT_BACKOFF_SECONDS)
                .long(ARG_DB_CONNECT_BACKOFF_SECONDS)
                .help("Initial delay between database connection attempts, doubled each retry")
                .default_value("1")
                .env("ENTRECORE_DB_CONNECT_BACKOFF_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        );

    let command = auth::with_args(command);
    let command = google::with_args(command);
    logging::with_args(command)
}
