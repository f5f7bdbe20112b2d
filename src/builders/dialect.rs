use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::SqlRepoError;

/// SQL text variations between storage engines.
///
/// `MySql` produces the canonical text (`WHERE 1`, `LIMIT offset, count`,
/// `UPDATE ... LIMIT 1`). The others only differ where their engine would
/// reject that text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    MySql,
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Predicate that matches every row.
    pub fn match_all(self) -> &'static str {
        match self {
            Dialect::MySql | Dialect::Sqlite => "1",
            Dialect::Postgres => "TRUE",
        }
    }

    /// LIMIT clause, including its leading space.
    pub fn limit(self, offset: u64, count: u64) -> String {
        match self {
            Dialect::MySql | Dialect::Sqlite => format!(" LIMIT {offset}, {count}"),
            Dialect::Postgres => format!(" LIMIT {count} OFFSET {offset}"),
        }
    }

    /// Restricts an UPDATE/DELETE head to at most one row matching `predicate`.
    ///
    /// SQLite and Postgres have no `LIMIT` on UPDATE/DELETE, so the row is
    /// picked by its physical id in a sub-select instead.
    pub fn single_row(self, head: &str, table: &str, predicate: &str) -> String {
        match self {
            Dialect::MySql => format!("{head} WHERE {predicate} LIMIT 1"),
            Dialect::Sqlite => format!(
                "{head} WHERE rowid IN (SELECT rowid FROM {table} WHERE {predicate} LIMIT 1)"
            ),
            Dialect::Postgres => format!(
                "{head} WHERE ctid IN (SELECT ctid FROM {table} WHERE {predicate} LIMIT 1)"
            ),
        }
    }

    /// Clause that makes an INSERT return `column`, including its leading
    /// space. Empty where the engine reports generated keys on its own.
    pub fn returning(self, column: &str) -> String {
        match self {
            Dialect::MySql | Dialect::Sqlite => String::new(),
            Dialect::Postgres => format!(" RETURNING {column}"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = SqlRepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(SqlRepoError::Configuration(format!(
                "unknown SQL dialect `{other}`; expected mysql|sqlite|postgres"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_forms() {
        assert_eq!(Dialect::MySql.limit(20, 10), " LIMIT 20, 10");
        assert_eq!(Dialect::Postgres.limit(20, 10), " LIMIT 10 OFFSET 20");
    }

    #[test]
    fn test_single_row() {
        assert_eq!(
            Dialect::MySql.single_row("DELETE FROM users", "users", "id = :id"),
            "DELETE FROM users WHERE id = :id LIMIT 1"
        );
        assert_eq!(
            Dialect::Sqlite.single_row("DELETE FROM users", "users", "id = :id"),
            "DELETE FROM users WHERE rowid IN (SELECT rowid FROM users WHERE id = :id LIMIT 1)"
        );
    }

    #[test]
    fn test_returning() {
        assert_eq!(Dialect::Postgres.returning("id"), " RETURNING id");
        assert_eq!(Dialect::Sqlite.returning("id"), "");
        assert_eq!(Dialect::MySql.returning("id"), "");
    }

    #[test]
    fn test_parse() {
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert!(matches!(
            "oracle".parse::<Dialect>(),
            Err(SqlRepoError::Configuration(_))
        ));
    }
}
