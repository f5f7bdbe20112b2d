use std::collections::HashMap;

use serde::Serialize;

use crate::{
    error::{Result, SqlRepoError},
    Column,
};

use super::SqlValue;

/// Driver-agnostic raw result of one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQueryResult {
    pub columns: Vec<String>,
    /// Values of each record, in `columns` order
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows changed by a DML statement, or rows returned by a query
    pub rows_affected: u64,
    /// Auto-generated key reported by the connection, if any
    pub last_insert_id: Option<i64>,
}

impl RawQueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        let rows_affected = rows.len() as u64;
        Self {
            columns,
            rows,
            rows_affected,
            last_insert_id: None,
        }
    }

    /// Result of a statement that returns no rows.
    pub fn affected(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected,
            last_insert_id,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// One record, keyed by column name. Column order is not kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    values: HashMap<String, SqlValue>,
}

impl Row {
    pub(crate) fn new(columns: &[String], values: Vec<SqlValue>) -> Self {
        Self {
            values: columns.iter().cloned().zip(values).collect(),
        }
    }

    /// Value of `column`; [`SqlRepoError::ColumnNotFound`] when absent.
    pub fn get<T: Column + ?Sized>(&self, column: &T) -> Result<&SqlValue> {
        self.values
            .get(column.column_name())
            .ok_or_else(|| SqlRepoError::ColumnNotFound(column.column_name().to_string()))
    }

    pub fn try_get<T: Column + ?Sized>(&self, column: &T) -> Option<&SqlValue> {
        self.values.get(column.column_name())
    }

    pub fn columns(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Rows of one executed statement plus what the engine reported about it.
///
/// Zero rows is an ordinary result.
#[derive(Debug, Clone)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Row>,
    rows_affected: u64,
    last_insert_id: Option<i64>,
}

impl QueryResult {
    pub fn from_raw(raw: RawQueryResult) -> Self {
        let RawQueryResult {
            columns,
            rows,
            rows_affected,
            last_insert_id,
        } = raw;
        let rows = rows
            .into_iter()
            .map(|record| Row::new(&columns, record))
            .collect();
        Self {
            columns,
            rows,
            rows_affected,
            last_insert_id,
        }
    }

    /// The only row; [`SqlRepoError::UnexpectedRowCount`] for zero or several.
    pub fn single_row(self) -> Result<Row> {
        let actual = self.rows.len();
        let mut rows = self.rows.into_iter();
        match (rows.next(), rows.next()) {
            (Some(row), None) => Ok(row),
            _ => Err(SqlRepoError::UnexpectedRowCount {
                expected: 1,
                actual,
            }),
        }
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn rows(self) -> Vec<Row> {
        self.rows
    }

    /// Borrowing form of [`rows`](Self::rows).
    pub fn rows_ref(&self) -> &[Row] {
        &self.rows
    }

    /// Column names in statement order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows changed by a DML statement, or rows returned by a query.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
