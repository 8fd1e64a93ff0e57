//! Log output for the daemon
//!
//! Everything is written to stderr. `RUST_LOG`, when set, takes precedence
//! over the configured level, so per-module filters such as
//! `RUST_LOG=libplurboost::cursor=debug` work as usual.
//!
//! ```no_run
//! use libplurboost::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::from_env().verbose(true).init();
//!
//! // Or pick everything explicitly
//! LoggingConfig::new(LogFormat::Json, "warn").init();
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

const FORMAT_ENV: &str = "PLURBOOST_LOG_FORMAT";
const LEVEL_ENV: &str = "PLURBOOST_LOG_LEVEL";
const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One plain line per event
    Text,
    /// One JSON object per line
    Json,
    /// Multi-line, colored; for watching the daemon by hand
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
        }
    }

    /// Read `PLURBOOST_LOG_FORMAT` and `PLURBOOST_LOG_LEVEL`
    ///
    /// Unset or unparseable values fall back to text at info level.
    pub fn from_env() -> Self {
        let format = std::env::var(FORMAT_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);
        let level = std::env::var(LEVEL_ENV).unwrap_or_else(|_| DEFAULT_LEVEL.to_string());

        Self::new(format, level)
    }

    /// Lower the level to debug when `verbose` is set
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.level = "debug".to_string();
        }
        self
    }

    /// Install the global subscriber
    ///
    /// Only the first call in a process takes effect.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);

        let _ = match self.format {
            LogFormat::Text => builder.with_target(false).try_init(),
            LogFormat::Json => builder.json().flatten_event(true).try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };
    }
}

/// Initialize logging from the environment only
pub fn init_default() {
    LoggingConfig::from_env().init();
}
