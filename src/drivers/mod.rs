mod sqlite;
mod tokio_postgres;

pub use self::in_memory_test::{
    InMemoryTestConnection, InMemoryTestDriver, InMemoryTestResponseBuilder, RecordedQuery,
};
pub use self::sqlite::{SqliteConnection, SqliteDriver, SqliteTarget};
pub use self::tokio_postgres::{TokioPostgresConnection, TokioPostgresDriver};

/// Whether a statement is an INSERT, the only kind that reports a generated key.
pub(crate) fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}
