use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, SqlRepoError};
use crate::logging::{LogSettings, QueryLogger};
use crate::traits::{DatabaseConnection, DatabaseDriver};
use crate::types::{BoundParameter, ParamType, QueryResult, Row, SqlValue, ValueMap};

/// The statement currently owned by a [`DataMapper`].
struct PreparedStatement {
    handle: Arc<dyn DatabaseDriver>,
    sql: String,
    params: Vec<BoundParameter>,
}

/// Prepares, binds and executes statements, and holds the result of the
/// last execution.
///
/// A mapper owns at most one statement at a time; preparing a new one
/// replaces the previous. A live handle is opened from the connection when
/// a statement is prepared and closed again once it has executed. Use one
/// mapper per concurrent caller.
pub struct DataMapper {
    connection: Arc<dyn DatabaseConnection>,
    statement: Option<PreparedStatement>,
    outcome: Option<QueryResult>,
    log_settings: LogSettings,
}

impl DataMapper {
    pub fn new(connection: Arc<dyn DatabaseConnection>) -> Self {
        Self {
            connection,
            statement: None,
            outcome: None,
            log_settings: LogSettings::default(),
        }
    }

    pub fn with_log_settings(mut self, settings: LogSettings) -> Self {
        self.log_settings = settings;
        self
    }

    pub fn connection(&self) -> &Arc<dyn DatabaseConnection> {
        &self.connection
    }

    /// Storage type a value binds with. See [`ParamType::infer`].
    pub fn bind(value: &SqlValue) -> ParamType {
        ParamType::infer(value)
    }

    /// Merges conditions and extra parameters into one set of bind values;
    /// parameters win on key collisions.
    pub fn build_query_parameters(conditions: &ValueMap, parameters: &ValueMap) -> ValueMap {
        conditions.merged(parameters)
    }

    /// Opens a handle and prepares `sql` on it, replacing any prior statement.
    pub async fn prepare(&mut self, sql: &str) -> Result<&mut Self> {
        if let Some(previous) = self.statement.take() {
            debug!(sql = %previous.sql, "replacing unexecuted statement");
            self.connection.close().await?;
        }

        let handle = self.connection.open().await?;
        if let Err(err) = handle.prepare(sql).await {
            // The handle is useless without a statement; give it back.
            self.connection.close().await?;
            return Err(err);
        }

        self.statement = Some(PreparedStatement {
            handle,
            sql: sql.to_string(),
            params: Vec::new(),
        });
        Ok(self)
    }

    /// Binds every field to its `:key` placeholder.
    ///
    /// With `is_search` each value is bound as the string `%value%`.
    pub fn bind_parameters(&mut self, fields: &ValueMap, is_search: bool) -> Result<&mut Self> {
        let statement = self.statement.as_mut().ok_or_else(|| {
            SqlRepoError::StorageExecution("cannot bind parameters: no statement prepared".into())
        })?;

        for (key, value) in fields.iter() {
            let value = if is_search {
                SqlValue::Text(search_pattern(value))
            } else {
                value.clone()
            };
            let param = BoundParameter::new(key, value);
            // The search pattern is always text, even for numeric terms.
            let param = if is_search {
                BoundParameter {
                    param_type: ParamType::String,
                    ..param
                }
            } else {
                param
            };

            match statement.params.iter_mut().find(|p| p.name == param.name) {
                Some(existing) => *existing = param,
                None => statement.params.push(param),
            }
        }
        Ok(self)
    }

    /// Same as [`bind_parameters`](Self::bind_parameters) for a JSON object.
    pub fn bind_json_parameters(
        &mut self,
        fields: &serde_json::Value,
        is_search: bool,
    ) -> Result<&mut Self> {
        let fields = ValueMap::try_from(fields)?;
        self.bind_parameters(&fields, is_search)
    }

    /// Parameters bound to the current statement.
    pub fn bound_parameters(&self) -> &[BoundParameter] {
        self.statement
            .as_ref()
            .map(|s| s.params.as_slice())
            .unwrap_or(&[])
    }

    /// Runs the prepared statement and closes its handle.
    ///
    /// Returns `false` without touching storage when nothing is prepared.
    pub async fn execute(&mut self) -> Result<bool> {
        let Some(statement) = self.statement.take() else {
            return Ok(false);
        };

        let logger = QueryLogger::new(&statement.sql, &self.log_settings);
        let executed = statement.handle.execute(&statement.sql, &statement.params).await;
        drop(statement.handle);
        let closed = self.connection.close().await;

        match executed {
            Ok(raw) => {
                logger.finish(raw.rows_affected);
                self.outcome = Some(QueryResult::from_raw(raw));
                closed?;
                Ok(true)
            }
            Err(err) => {
                logger.fail(&err);
                self.outcome = None;
                Err(err)
            }
        }
    }

    /// Rows affected (or returned) by the last execution.
    pub fn rows_count(&self) -> u64 {
        self.outcome.as_ref().map_or(0, QueryResult::rows_affected)
    }

    /// First row of the last execution.
    pub fn result(&self) -> Option<Row> {
        self.outcome.as_ref().and_then(|o| o.first().cloned())
    }

    /// All rows of the last execution, in order.
    pub fn results(&self) -> Vec<Row> {
        self.outcome
            .as_ref()
            .map(|o| o.rows_ref().to_vec())
            .unwrap_or_default()
    }

    /// Takes the full result of the last execution.
    pub fn take_outcome(&mut self) -> Option<QueryResult> {
        self.outcome.take()
    }

    /// Last auto-generated primary key.
    pub fn last_id(&self) -> Result<i64> {
        self.outcome
            .as_ref()
            .and_then(QueryResult::last_insert_id)
            .filter(|id| *id != 0)
            .ok_or(SqlRepoError::LastIdUnavailable)
    }

    /// prepare -> bind -> execute.
    pub async fn persist(&mut self, sql: &str, parameters: &ValueMap) -> Result<bool> {
        self.prepare(sql).await?;
        self.bind_parameters(parameters, false)?;
        self.execute().await
    }

    /// Like [`persist`](Self::persist), binding parameters as search terms.
    pub async fn persist_search(&mut self, sql: &str, parameters: &ValueMap) -> Result<bool> {
        self.prepare(sql).await?;
        self.bind_parameters(parameters, true)?;
        self.execute().await
    }
}

/// `%term%` built from the form the term would bind as: booleans as
/// `0`/`1`, null as the empty term.
fn search_pattern(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "%%".to_string(),
        SqlValue::Bool(flag) => format!("%{}%", u8::from(*flag)),
        other => format!("%{other}%"),
    }
}
