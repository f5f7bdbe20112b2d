//! Runtime configuration: which storage to talk to and which registered
//! components to assemble.

use std::env;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::builders::Dialect;
use crate::error::{Result, SqlRepoError};
use crate::logging::{LogLevel, LogSettings};

/// Where the data lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum DatabaseUrl {
    /// SQLite database file
    Sqlite { path: PathBuf },
    /// PostgreSQL connection string
    Postgres { connection_string: String },
    /// Private in-memory SQLite database
    Memory,
}

impl DatabaseUrl {
    /// Parses `sqlite::memory:`, `sqlite:<path>`, `postgres://…` and
    /// `postgresql://…`. Anything without a scheme is a SQLite file path.
    pub fn parse_url(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SqlRepoError::Configuration("database url is empty".into()));
        }

        if let Some(rest) = s.strip_prefix("sqlite:") {
            let path = rest.strip_prefix("//").unwrap_or(rest);
            return match path {
                ":memory:" => Ok(Self::Memory),
                "" => Err(SqlRepoError::Configuration(format!(
                    "sqlite url `{s}` names no file"
                ))),
                path => Ok(Self::Sqlite {
                    path: PathBuf::from(path),
                }),
            };
        }
        if s.starts_with("postgresql://") || s.starts_with("postgres://") {
            return Ok(Self::Postgres {
                connection_string: s.to_owned(),
            });
        }
        if let Some((scheme, _)) = s.split_once("://") {
            return Err(SqlRepoError::Configuration(format!(
                "unsupported database scheme `{scheme}`"
            )));
        }
        if s == ":memory:" {
            return Ok(Self::Memory);
        }

        Ok(Self::Sqlite {
            path: PathBuf::from(s),
        })
    }

    /// Registry key of the connection type serving this URL.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } | Self::Memory => "sqlite",
            Self::Postgres { .. } => "postgres",
        }
    }

    /// SQL dialect spoken at this URL.
    pub fn dialect(&self) -> Dialect {
        match self {
            Self::Sqlite { .. } | Self::Memory => Dialect::Sqlite,
            Self::Postgres { .. } => Dialect::Postgres,
        }
    }

    pub fn to_connection_string(&self) -> String {
        match self {
            Self::Sqlite { path } => format!("sqlite:{}", path.display()),
            Self::Postgres { connection_string } => connection_string.clone(),
            Self::Memory => "sqlite::memory:".into(),
        }
    }

    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::Memory
    }
}

impl Display for DatabaseUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Credentials stay out of logs.
        match self {
            Self::Postgres { connection_string } => match connection_string.rsplit_once('@') {
                Some((_, host)) => write!(f, "postgres://…@{host}"),
                None => f.write_str(connection_string),
            },
            other => f.write_str(&other.to_connection_string()),
        }
    }
}

impl FromStr for DatabaseUrl {
    type Err = SqlRepoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_url(s)
    }
}

impl TryFrom<String> for DatabaseUrl {
    type Error = SqlRepoError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse_url(&s)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SqlRepoConfig {
    pub database_url: DatabaseUrl,
    /// Query builder registry key
    pub query_builder: String,
    /// Overrides the dialect implied by `database_url`
    pub dialect: Option<Dialect>,
    /// CRUD registry key
    pub crud: String,
    /// Repository registry key
    pub repository: String,
    pub logging: LogSettings,
}

impl Default for SqlRepoConfig {
    fn default() -> Self {
        Self {
            database_url: DatabaseUrl::default(),
            query_builder: "standard".into(),
            dialect: None,
            crud: "crud".into(),
            repository: "default".into(),
            logging: LogSettings::default(),
        }
    }
}

impl SqlRepoConfig {
    pub fn new(database_url: DatabaseUrl) -> Self {
        Self {
            database_url,
            ..Self::default()
        }
    }

    /// Load configuration from `SQLREPO_*` environment variables, falling
    /// back to defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns [`SqlRepoError::Configuration`] if a variable is set to a
    /// malformed value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("SQLREPO_DATABASE_URL") {
            config.database_url = url.parse()?;
        }
        if let Some(key) = lookup("SQLREPO_QUERY_BUILDER") {
            config.query_builder = key;
        }
        if let Some(dialect) = lookup("SQLREPO_DIALECT") {
            config.dialect = Some(dialect.parse()?);
        }
        if let Some(level) = lookup("SQLREPO_LOG_LEVEL") {
            config.logging.level = level.parse::<LogLevel>()?;
        }
        if let Some(ms) = lookup("SQLREPO_SLOW_STATEMENT_MS") {
            config.logging.slow_statements_threshold_ms = ms.trim().parse().map_err(|e| {
                SqlRepoError::Configuration(format!("invalid SQLREPO_SLOW_STATEMENT_MS `{ms}`: {e}"))
            })?;
        }

        Ok(config)
    }

    /// Parses a JSON configuration document.
    pub fn from_json(document: &str) -> Result<Self> {
        serde_json::from_str(document)
            .map_err(|e| SqlRepoError::Configuration(format!("invalid configuration: {e}")))
    }

    /// The configured dialect, or the one implied by the database URL.
    pub fn effective_dialect(&self) -> Dialect {
        self.dialect.unwrap_or_else(|| self.database_url.dialect())
    }
}
