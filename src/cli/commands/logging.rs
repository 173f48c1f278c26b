use clap::{Arg, ArgAction, ArgMatches, Command, builder::PossibleValuesParser};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_FORMAT: &str = "log-format";

const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    /// `None` keeps the subscriber at ERROR.
    pub level: Option<Level>,
    pub format: LogFormat,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let verbosity = matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0);
        let format = match matches.get_one::<String>(ARG_LOG_FORMAT) {
            Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        Self {
            level: level_for(verbosity),
            format,
        }
    }
}

/// `-v` count (or level index) to tracing level.
#[must_use]
pub const fn level_for(verbosity: u8) -> Option<Level> {
    match verbosity {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

/// Accepts a level name or its index, as `ENTRECORE_LOG_LEVEL` carries either.
fn parse_level(level: &str) -> Result<u8, String> {
    let level = level.trim();
    if let Ok(index) = level.parse::<u8>() {
        return if index <= 5 {
            Ok(index)
        } else {
            Err(format!("log level index out of range: {index}"))
        };
    }
    LEVEL_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(level))
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| format!("invalid log level: {level}"))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("ENTRECORE_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(parse_level),
        )
        .arg(
            Arg::new(ARG_LOG_FORMAT)
                .long(ARG_LOG_FORMAT)
                .help("Log output format")
                .env("ENTRECORE_LOG_FORMAT")
                .default_value("pretty")
                .ignore_case(true)
                .value_parser(PossibleValuesParser::new(["pretty", "json"])),
        )
}
