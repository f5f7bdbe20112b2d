use thiserror::Error;

/// Error type for sqlrepo operations
#[derive(Debug, Error)]
pub enum SqlRepoError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("No last insert id reported by the connection")]
    LastIdUnavailable,

    #[error("Statement failed: {0}")]
    StorageExecution(String),

    #[error("Invalid query descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: usize, actual: usize },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),
}

/// Result type alias for sqlrepo operations
pub type Result<T> = std::result::Result<T, SqlRepoError>;

/// Returned by [`Lookup::or_404`](crate::repository::Lookup::or_404) when the
/// requested row does not exist.
/// Separate from [`SqlRepoError`], which only covers pipeline failures.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("No row in `{table}` with {column} = {id}")]
pub struct NotFound {
    pub table: String,
    pub column: String,
    pub id: String,
}
