use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::debug;

use super::is_insert;
use crate::error::{Result, SqlRepoError};
use crate::traits::{DatabaseConnection, DatabaseDriver};
use crate::types::{BoundParameter, RawQueryResult, SqlValue, StorageValue};

/// Where a [`SqliteConnection`] keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    /// A private in-memory database, alive as long as the connection value
    Memory,
    File(PathBuf),
}

/// SQLite storage connection.
///
/// File databases are opened on [`open`](DatabaseConnection::open) and
/// released on [`close`](DatabaseConnection::close). An in-memory database
/// would not survive that, so it keeps a single session for its lifetime.
pub struct SqliteConnection {
    target: SqliteTarget,
    memory: Option<Arc<Mutex<Connection>>>,
    active: Mutex<Option<Arc<SqliteDriver>>>,
}

impl SqliteConnection {
    pub fn in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()
            .map_err(|e| SqlRepoError::Connection(e.to_string()))?;
        Ok(Self {
            target: SqliteTarget::Memory,
            memory: Some(Arc::new(Mutex::new(connection))),
            active: Mutex::new(None),
        })
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            target: SqliteTarget::File(path.as_ref().to_path_buf()),
            memory: None,
            active: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &SqliteTarget {
        &self.target
    }

    /// Runs a batch of `;`-separated statements, e.g. a schema script.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let driver = self.open_driver().await?;
        let sql = sql.to_string();
        let outcome = driver
            .blocking(move |conn| conn.execute_batch(&sql).map_err(storage_error))
            .await;
        self.close().await?;
        outcome
    }

    async fn open_driver(&self) -> Result<Arc<SqliteDriver>> {
        let session = match (&self.target, &self.memory) {
            (SqliteTarget::Memory, Some(shared)) => Arc::clone(shared),
            (SqliteTarget::File(path), _) => {
                let path = path.clone();
                let connection = tokio::task::spawn_blocking(move || Connection::open(path))
                    .await
                    .map_err(|e| SqlRepoError::Connection(e.to_string()))?
                    .map_err(|e| SqlRepoError::Connection(e.to_string()))?;
                Arc::new(Mutex::new(connection))
            }
            (SqliteTarget::Memory, None) => {
                return Err(SqlRepoError::Connection(
                    "in-memory sqlite database is not initialized".into(),
                ))
            }
        };

        let driver = Arc::new(SqliteDriver { session });
        *self.active.lock().map_err(|_| poisoned())? = Some(Arc::clone(&driver));
        Ok(driver)
    }
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    async fn open(&self) -> Result<Arc<dyn DatabaseDriver>> {
        let driver = self.open_driver().await?;
        debug!(database = ?self.target, "sqlite handle opened");
        Ok(driver)
    }

    async fn close(&self) -> Result<()> {
        self.active.lock().map_err(|_| poisoned())?.take();
        Ok(())
    }
}

/// A live SQLite session.
pub struct SqliteDriver {
    session: Arc<Mutex<Connection>>,
}

impl SqliteDriver {
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let conn = session.lock().map_err(|_| poisoned())?;
            f(&*conn)
        })
        .await
        .map_err(|e| SqlRepoError::StorageExecution(e.to_string()))?
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    async fn prepare(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.blocking(move |conn| {
            conn.prepare_cached(&sql).map_err(storage_error)?;
            Ok(())
        })
        .await
    }

    async fn execute(&self, sql: &str, params: &[BoundParameter]) -> Result<RawQueryResult> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.blocking(move |conn| run_statement(conn, &sql, &params))
            .await
    }
}

fn run_statement(conn: &Connection, sql: &str, params: &[BoundParameter]) -> Result<RawQueryResult> {
    let mut stmt = conn.prepare_cached(sql).map_err(storage_error)?;

    for param in params {
        // Values without a matching placeholder are not part of this statement.
        let Some(index) = stmt
            .parameter_index(&param.placeholder())
            .map_err(storage_error)?
        else {
            continue;
        };
        let bound = match param.storage_value() {
            StorageValue::Integer(i) => stmt.raw_bind_parameter(index, i),
            StorageValue::Text(s) => stmt.raw_bind_parameter(index, &*s),
            StorageValue::Null => stmt.raw_bind_parameter(index, rusqlite::types::Null),
        };
        bound.map_err(storage_error)?;
    }

    let column_count = stmt.column_count();
    if column_count == 0 {
        let changed = stmt.raw_execute().map_err(storage_error)?;
        let last_insert_id = is_insert(sql).then(|| conn.last_insert_rowid());
        return Ok(RawQueryResult::affected(changed as u64, last_insert_id));
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.raw_query();
    let mut values = Vec::new();
    while let Some(row) = rows.next().map_err(storage_error)? {
        let mut record = Vec::with_capacity(column_count);
        for index in 0..column_count {
            record.push(from_value_ref(row.get_ref(index).map_err(storage_error)?));
        }
        values.push(record);
    }

    Ok(RawQueryResult::new(columns, values))
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int64(i),
        ValueRef::Real(f) => SqlValue::Text(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn storage_error(err: rusqlite::Error) -> SqlRepoError {
    SqlRepoError::StorageExecution(err.to_string())
}

fn poisoned() -> SqlRepoError {
    SqlRepoError::Connection("sqlite session lock poisoned".into())
}
