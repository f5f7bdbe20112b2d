use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::sync::Mutex;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, error};

use super::is_insert;
use crate::error::{Result, SqlRepoError};
use crate::placeholders::to_positional;
use crate::traits::{DatabaseConnection, DatabaseDriver};
use crate::types::{BoundParameter, RawQueryResult, SqlValue, StorageValue};

/// PostgreSQL storage connection using tokio-postgres.
///
/// The session is established on the first `open` and kept for later
/// ones; `close` leaves it idle. It is re-established if the server drops it.
pub struct TokioPostgresConnection {
    config: Config,
    session: Mutex<Option<Arc<TokioPostgresDriver>>>,
}

impl TokioPostgresConnection {
    /// Parses the connection string without connecting.
    pub fn new(connection_string: &str) -> Result<Self> {
        let config = connection_string
            .parse::<Config>()
            .map_err(|e| SqlRepoError::Configuration(format!("invalid postgres url: {e}")))?;
        Ok(Self {
            config,
            session: Mutex::new(None),
        })
    }
}

#[async_trait]
impl DatabaseConnection for TokioPostgresConnection {
    async fn open(&self) -> Result<Arc<dyn DatabaseDriver>> {
        let mut session = self.session.lock().await;
        if let Some(driver) = session.as_ref() {
            if !driver.client.is_closed() {
                return Ok(Arc::clone(driver) as Arc<dyn DatabaseDriver>);
            }
        }

        let driver = Arc::new(TokioPostgresDriver::connect(&self.config).await?);
        *session = Some(Arc::clone(&driver));
        Ok(driver)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// PostgreSQL driver implementation using tokio-postgres.
pub struct TokioPostgresDriver {
    client: Client,
}

impl TokioPostgresDriver {
    /// Connect to a PostgreSQL database.
    pub async fn connect(config: &Config) -> Result<Self> {
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| SqlRepoError::Connection(e.to_string()))?;

        // Spawn the connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection error");
            }
        });

        debug!("postgres session established");
        Ok(Self { client })
    }
}

#[async_trait]
impl DatabaseDriver for TokioPostgresDriver {
    async fn prepare(&self, sql: &str) -> Result<()> {
        let positional = to_positional(sql);
        self.client
            .prepare(&positional.sql)
            .await
            .map_err(|e| SqlRepoError::StorageExecution(e.to_string()))?;
        Ok(())
    }

    async fn execute(&self, sql: &str, params: &[BoundParameter]) -> Result<RawQueryResult> {
        let positional = to_positional(sql);
        let statement = self
            .client
            .prepare(&positional.sql)
            .await
            .map_err(|e| SqlRepoError::StorageExecution(e.to_string()))?;

        let values = positional
            .names
            .iter()
            .map(|name| {
                params
                    .iter()
                    .find(|p| &p.name == name)
                    .map(|p| PgParam(p.storage_value()))
                    .ok_or_else(|| {
                        SqlRepoError::StorageExecution(format!("no value bound for :{name}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        if statement.columns().is_empty() {
            let rows_affected = self
                .client
                .execute(&statement, &param_refs)
                .await
                .map_err(|e| SqlRepoError::StorageExecution(e.to_string()))?;
            // Generated keys only come back through `RETURNING`.
            return Ok(RawQueryResult::affected(rows_affected, None));
        }

        let rows = self
            .client
            .query(&statement, &param_refs)
            .await
            .map_err(|e| SqlRepoError::StorageExecution(e.to_string()))?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let result_rows = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| row_value(row, i))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let mut result = RawQueryResult::new(columns, result_rows);
        if is_insert(sql) {
            result.last_insert_id = returned_key(&result);
        }
        Ok(result)
    }
}

/// Key from an `INSERT ... RETURNING` that produced exactly one row.
fn returned_key(result: &RawQueryResult) -> Option<i64> {
    match result.rows.as_slice() {
        [row] => row.first().and_then(SqlValue::as_i64),
        _ => None,
    }
}

type EncodeResult = std::result::Result<IsNull, Box<dyn Error + Sync + Send>>;

fn is_text_type(ty: &Type) -> bool {
    [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty)
}

fn is_number_type(ty: &Type) -> bool {
    [Type::INT2, Type::INT4, Type::INT8, Type::FLOAT4, Type::FLOAT8].contains(ty)
}

fn cannot_bind(value: &str, ty: &Type) -> Box<dyn Error + Sync + Send> {
    format!("cannot bind `{value}` to a parameter of type {ty}").into()
}

/// A bound value converted to the type the server inferred for its
/// placeholder. Only text, integer, float and boolean parameters are
/// supported.
#[derive(Debug)]
struct PgParam<'a>(StorageValue<'a>);

impl PgParam<'_> {
    fn encode_integer(i: i64, ty: &Type, out: &mut BytesMut) -> EncodeResult {
        if *ty == Type::INT2 {
            i16::try_from(i)?.to_sql(ty, out)
        } else if *ty == Type::INT4 {
            i32::try_from(i)?.to_sql(ty, out)
        } else if *ty == Type::INT8 {
            i.to_sql(ty, out)
        } else if *ty == Type::FLOAT4 {
            (i as f32).to_sql(ty, out)
        } else if *ty == Type::FLOAT8 {
            (i as f64).to_sql(ty, out)
        } else if *ty == Type::BOOL {
            (i != 0).to_sql(ty, out)
        } else if is_text_type(ty) {
            i.to_string().as_str().to_sql(ty, out)
        } else {
            Err(cannot_bind(&i.to_string(), ty))
        }
    }

    fn encode_text(text: &str, ty: &Type, out: &mut BytesMut) -> EncodeResult {
        if is_text_type(ty) {
            text.to_sql(ty, out)
        } else if *ty == Type::INT2 {
            text.trim().parse::<i16>().map_err(|_| cannot_bind(text, ty))?.to_sql(ty, out)
        } else if *ty == Type::INT4 {
            text.trim().parse::<i32>().map_err(|_| cannot_bind(text, ty))?.to_sql(ty, out)
        } else if *ty == Type::INT8 {
            text.trim().parse::<i64>().map_err(|_| cannot_bind(text, ty))?.to_sql(ty, out)
        } else if *ty == Type::FLOAT4 {
            text.trim().parse::<f32>().map_err(|_| cannot_bind(text, ty))?.to_sql(ty, out)
        } else if *ty == Type::FLOAT8 {
            text.trim().parse::<f64>().map_err(|_| cannot_bind(text, ty))?.to_sql(ty, out)
        } else if *ty == Type::BOOL {
            parse_bool(text)
                .ok_or_else(|| cannot_bind(text, ty))?
                .to_sql(ty, out)
        } else {
            Err(cannot_bind(text, ty))
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> EncodeResult {
        match &self.0 {
            StorageValue::Null => Ok(IsNull::Yes),
            StorageValue::Integer(i) => Self::encode_integer(*i, ty, out),
            StorageValue::Text(s) => Self::encode_text(s, ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        is_text_type(ty) || is_number_type(ty) || *ty == Type::BOOL
    }

    to_sql_checked!();
}

/// Any column value as its raw wire bytes, `None` for SQL NULL.
struct RawColumn<'a>(Option<&'a [u8]>);

impl<'a> FromSql<'a> for RawColumn<'a> {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(Self(Some(raw)))
    }

    fn from_sql_null(_ty: &Type) -> std::result::Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(Self(None))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Convert a row value at a given index by its column type.
///
/// Non-null values of types without a mapping (dates, numerics, uuids,
/// json) are an error; cast them to text in the query to read them.
fn row_value(row: &tokio_postgres::Row, index: usize) -> Result<SqlValue> {
    let read = |e: tokio_postgres::Error| SqlRepoError::StorageExecution(e.to_string());
    let column = &row.columns()[index];
    let type_ = column.type_();

    let value = if *type_ == Type::BOOL {
        row.try_get::<_, Option<bool>>(index)
            .map_err(read)?
            .map(SqlValue::Bool)
    } else if *type_ == Type::INT2 {
        row.try_get::<_, Option<i16>>(index)
            .map_err(read)?
            .map(|v| SqlValue::Int32(v.into()))
    } else if *type_ == Type::INT4 {
        row.try_get::<_, Option<i32>>(index)
            .map_err(read)?
            .map(SqlValue::Int32)
    } else if *type_ == Type::INT8 {
        row.try_get::<_, Option<i64>>(index)
            .map_err(read)?
            .map(SqlValue::Int64)
    } else if *type_ == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(index)
            .map_err(read)?
            .map(|v| SqlValue::Text(v.to_string()))
    } else if *type_ == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(index)
            .map_err(read)?
            .map(|v| SqlValue::Text(v.to_string()))
    } else if is_text_type(type_) {
        row.try_get::<_, Option<String>>(index)
            .map_err(read)?
            .map(SqlValue::Text)
    } else {
        match row.try_get::<_, RawColumn<'_>>(index).map_err(read)?.0 {
            None => None,
            Some(_) => return Err(unsupported_column(column.name(), type_)),
        }
    };

    Ok(value.unwrap_or(SqlValue::Null))
}

fn unsupported_column(name: &str, type_: &Type) -> SqlRepoError {
    SqlRepoError::StorageExecution(format!(
        "column `{name}` has unsupported type {type_}; cast it to text in the query"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: StorageValue<'_>, ty: &Type) -> Option<Vec<u8>> {
        let mut out = BytesMut::new();
        match PgParam(value).to_sql(ty, &mut out).unwrap() {
            IsNull::Yes => None,
            IsNull::No => Some(out.to_vec()),
        }
    }

    #[test]
    fn test_integer_param_follows_column_width() {
        assert_eq!(
            encode(StorageValue::Integer(7), &Type::INT4),
            Some(7i32.to_be_bytes().to_vec())
        );
        assert_eq!(
            encode(StorageValue::Integer(7), &Type::INT8),
            Some(7i64.to_be_bytes().to_vec())
        );
        assert_eq!(encode(StorageValue::Integer(1), &Type::BOOL), Some(vec![1]));
    }

    #[test]
    fn test_integer_param_into_text_column() {
        assert_eq!(
            encode(StorageValue::Integer(42), &Type::TEXT),
            Some(b"42".to_vec())
        );
    }

    #[test]
    fn test_null_and_text_params() {
        assert_eq!(encode(StorageValue::Null, &Type::INT4), None);
        assert_eq!(
            encode(StorageValue::Text("%An%".into()), &Type::VARCHAR),
            Some(b"%An%".to_vec())
        );
    }

    #[test]
    fn test_out_of_range_integer_is_rejected() {
        let mut out = BytesMut::new();
        assert!(PgParam(StorageValue::Integer(i64::MAX))
            .to_sql(&Type::INT2, &mut out)
            .is_err());
    }

    fn rejected(value: StorageValue<'_>, ty: &Type) -> bool {
        PgParam(value).to_sql(ty, &mut BytesMut::new()).is_err()
    }

    #[test]
    fn test_text_param_parsed_for_number_and_bool_columns() {
        assert_eq!(
            encode(StorageValue::Text("31".into()), &Type::INT4),
            Some(31i32.to_be_bytes().to_vec())
        );
        assert_eq!(
            encode(StorageValue::Text("1.5".into()), &Type::FLOAT8),
            Some(1.5f64.to_be_bytes().to_vec())
        );
        assert_eq!(encode(StorageValue::Text("true".into()), &Type::BOOL), Some(vec![1]));
        assert!(rejected(StorageValue::Text("abcd".into()), &Type::INT4));
        assert!(rejected(StorageValue::Text("maybe".into()), &Type::BOOL));
    }

    #[test]
    fn test_unsupported_parameter_types_are_rejected() {
        assert!(rejected(StorageValue::Text("2024".into()), &Type::DATE));
        assert!(rejected(StorageValue::Text("2024-01-01".into()), &Type::TIMESTAMP));
        assert!(rejected(StorageValue::Integer(5), &Type::NUMERIC));
        assert!(rejected(StorageValue::Text("abcd".into()), &Type::UUID));

        let mut out = BytesMut::new();
        assert!(PgParam(StorageValue::Text("2024-01-01".into()))
            .to_sql_checked(&Type::DATE, &mut out)
            .is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_insert_key_comes_from_returned_row() {
        let returned = RawQueryResult::new(vec!["id".to_string()], vec![vec![SqlValue::Int32(12)]]);
        assert_eq!(returned_key(&returned), Some(12));

        let none = RawQueryResult::new(vec!["id".to_string()], vec![]);
        assert_eq!(returned_key(&none), None);
        assert_eq!(returned_key(&RawQueryResult::affected(1, None)), None);
    }

    #[test]
    fn test_unmapped_column_values_are_not_null() {
        assert!(matches!(
            RawColumn::from_sql_null(&Type::TIMESTAMP),
            Ok(RawColumn(None))
        ));
        assert!(matches!(
            RawColumn::from_sql(&Type::TIMESTAMP, &[0, 1]),
            Ok(RawColumn(Some(_)))
        ));
        match unsupported_column("created_at", &Type::TIMESTAMP) {
            SqlRepoError::StorageExecution(message) => {
                assert!(message.contains("created_at"));
                assert!(message.contains("timestamp"));
            }
            other => panic!("Expected StorageExecution error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_malformed_url() {
        assert!(matches!(
            TokioPostgresConnection::new("postgres://user@host:notaport/db"),
            Err(SqlRepoError::Configuration(_))
        ));
    }
}
