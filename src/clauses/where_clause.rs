use crate::builders::Dialect;

/// Represents a WHERE clause condition over named placeholders.
/// Every column term binds to a placeholder of the same name.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// Matches every row (`WHERE 1`)
    MatchAll,
    /// column = :column
    Eq(String),
    /// column LIKE :column
    Like(String),
    /// clause AND clause
    And(Box<WhereClause>, Box<WhereClause>),
}

impl WhereClause {
    /// Creates an equality condition: column = :column
    pub fn eq(column: impl Into<String>) -> Self {
        WhereClause::Eq(column.into())
    }

    /// Creates a pattern condition: column LIKE :column
    pub fn like(column: impl Into<String>) -> Self {
        WhereClause::Like(column.into())
    }

    /// AND-joins one equality term per column, in order.
    /// No columns yields [`WhereClause::MatchAll`].
    pub fn all_eq<'a>(columns: impl IntoIterator<Item = &'a str>) -> Self {
        Self::fold(columns.into_iter().map(WhereClause::eq))
    }

    /// AND-joins one LIKE term per column, in order.
    pub fn all_like<'a>(columns: impl IntoIterator<Item = &'a str>) -> Self {
        Self::fold(columns.into_iter().map(WhereClause::like))
    }

    fn fold(terms: impl Iterator<Item = WhereClause>) -> Self {
        terms
            .reduce(|acc, term| acc.and(term))
            .unwrap_or(WhereClause::MatchAll)
    }

    /// Combines this clause with another using AND
    pub fn and(self, other: WhereClause) -> Self {
        WhereClause::And(Box::new(self), Box::new(other))
    }

    /// Builds the SQL fragment that follows `WHERE`.
    pub fn build_sql(&self, dialect: Dialect) -> String {
        match self {
            WhereClause::MatchAll => dialect.match_all().to_string(),
            WhereClause::Eq(col) => format!("{col} = :{col}"),
            WhereClause::Like(col) => format!("{col} LIKE :{col}"),
            WhereClause::And(left, right) => {
                format!("{} AND {}", left.build_sql(dialect), right.build_sql(dialect))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_clause() {
        let clause = WhereClause::eq("name");
        assert_eq!(clause.build_sql(Dialect::MySql), "name = :name");
    }

    #[test]
    fn test_and_clause() {
        let clause = WhereClause::all_eq(["name", "age", "city"]);
        assert_eq!(
            clause.build_sql(Dialect::MySql),
            "name = :name AND age = :age AND city = :city"
        );
    }

    #[test]
    fn test_empty_is_match_all() {
        let clause = WhereClause::all_eq(Vec::<&str>::new());
        assert_eq!(clause, WhereClause::MatchAll);
        assert_eq!(clause.build_sql(Dialect::MySql), "1");
        assert_eq!(clause.build_sql(Dialect::Postgres), "TRUE");
    }

    #[test]
    fn test_like_clause() {
        let clause = WhereClause::all_like(["first_name", "email"]);
        assert_eq!(
            clause.build_sql(Dialect::Sqlite),
            "first_name LIKE :first_name AND email LIKE :email"
        );
    }
}
