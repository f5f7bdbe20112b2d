//! Logging setup and per-statement logging.
//!
//! Statements are logged through `tracing` under the `sqlrepo::query`
//! target. Statements slower than the configured threshold are logged at a
//! separate (by default louder) level.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::error::{Result, SqlRepoError};

pub const QUERY_TARGET: &str = "sqlrepo::query";

// `tracing` has no dynamic levels, so dispatch on the level by hand.
macro_rules! dynamic_event {
    (target: $target:expr, $level:expr, $($args:tt)*) => {{
        match $level {
            Level::ERROR => ::tracing::event!(target: $target, Level::ERROR, $($args)*),
            Level::WARN => ::tracing::event!(target: $target, Level::WARN, $($args)*),
            Level::INFO => ::tracing::event!(target: $target, Level::INFO, $($args)*),
            Level::DEBUG => ::tracing::event!(target: $target, Level::DEBUG, $($args)*),
            Level::TRACE => ::tracing::event!(target: $target, Level::TRACE, $($args)*),
        }
    }};
}

/// A log level that can be switched off, read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = SqlRepoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(SqlRepoError::Configuration(format!(
                "unsupported log level `{other}`; expected off|error|warn|info|debug|trace"
            ))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default filter for [`init_logging`]; `RUST_LOG` takes precedence
    pub level: LogLevel,
    /// Level for executed statements
    pub statements_level: LogLevel,
    /// Level for statements slower than the threshold
    pub slow_statements_level: LogLevel,
    pub slow_statements_threshold_ms: u64,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            statements_level: LogLevel::Debug,
            slow_statements_level: LogLevel::Warn,
            slow_statements_threshold_ms: 1000,
        }
    }
}

impl LogSettings {
    pub fn slow_statements_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_statements_threshold_ms)
    }
}

/// Installs a global `tracing` fmt subscriber.
///
/// A subscriber that is already installed (by an earlier call or by the
/// application) is left in place.
pub fn init_logging(settings: &LogSettings) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(settings.level.as_str()).map_err(|err| {
            SqlRepoError::Configuration(format!("invalid log filter `{}`: {err}", settings.level))
        })?,
    };

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
    {
        tracing::info!(level = %settings.level, "sqlrepo logging initialized");
    }
    Ok(())
}

/// Times one statement and logs it when finished.
pub(crate) struct QueryLogger<'q> {
    sql: &'q str,
    start: Instant,
    settings: &'q LogSettings,
}

impl<'q> QueryLogger<'q> {
    pub(crate) fn new(sql: &'q str, settings: &'q LogSettings) -> Self {
        Self {
            sql,
            start: Instant::now(),
            settings,
        }
    }

    pub(crate) fn finish(&self, rows: u64) {
        let elapsed = self.start.elapsed();
        let was_slow = elapsed >= self.settings.slow_statements_threshold();

        let level = if was_slow {
            self.settings.slow_statements_level
        } else {
            self.settings.statements_level
        };

        if let Some(level) = level.to_tracing() {
            let summary = summarize(self.sql);
            dynamic_event!(
                target: QUERY_TARGET,
                level,
                summary = %summary,
                statement = self.sql,
                rows,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                slow = was_slow,
                "statement executed"
            );
        }
    }

    pub(crate) fn fail(&self, error: &SqlRepoError) {
        tracing::error!(
            target: QUERY_TARGET,
            statement = self.sql,
            elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0,
            %error,
            "statement failed"
        );
    }
}

/// First few words of a statement, for one-line log summaries.
fn summarize(sql: &str) -> String {
    const MAX_WORDS: usize = 4;

    let mut words = sql.split_whitespace();
    let mut summary: Vec<&str> = words.by_ref().take(MAX_WORDS).collect();
    if words.next().is_some() {
        summary.push("…");
    }
    summary.join(" ")
}
