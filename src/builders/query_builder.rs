use crate::clauses::WhereClause;
use crate::error::{Result, SqlRepoError};
use crate::types::ValueMap;

use super::descriptor::{
    DeleteScope, QueryDescriptor, QueryKind, QueryOptions, UpdateScope,
};
use super::Dialect;

/// Renders query descriptors into SQL text with named placeholders.
///
/// Each method handles one operation kind and returns `None` when the
/// descriptor is of another kind or lacks what that statement needs.
/// `None` is the failure marker; an empty string is never returned.
pub trait QueryBuilder: Send + Sync {
    fn insert_query(&self, descriptor: &QueryDescriptor) -> Option<String>;
    fn select_query(&self, descriptor: &QueryDescriptor) -> Option<String>;
    fn update_query(&self, descriptor: &QueryDescriptor) -> Option<String>;
    fn delete_query(&self, descriptor: &QueryDescriptor) -> Option<String>;
    fn search_query(&self, descriptor: &QueryDescriptor) -> Option<String>;
    fn raw_query(&self, descriptor: &QueryDescriptor) -> Option<String>;
}

/// A query builder scoped to one descriptor.
pub struct ScopedQuery<'a> {
    builder: &'a dyn QueryBuilder,
    descriptor: QueryDescriptor,
}

impl<'a> ScopedQuery<'a> {
    pub fn new(builder: &'a dyn QueryBuilder, descriptor: QueryDescriptor) -> Self {
        Self {
            builder,
            descriptor,
        }
    }

    /// Scopes a builder to a descriptor given in its string-keyed JSON form.
    pub fn from_json(builder: &'a dyn QueryBuilder, value: &serde_json::Value) -> Result<Self> {
        Ok(Self::new(builder, QueryDescriptor::from_json(value)?))
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    pub fn insert_query(&self) -> Option<String> {
        self.builder.insert_query(&self.descriptor)
    }

    pub fn select_query(&self) -> Option<String> {
        self.builder.select_query(&self.descriptor)
    }

    pub fn update_query(&self) -> Option<String> {
        self.builder.update_query(&self.descriptor)
    }

    pub fn delete_query(&self) -> Option<String> {
        self.builder.delete_query(&self.descriptor)
    }

    pub fn search_query(&self) -> Option<String> {
        self.builder.search_query(&self.descriptor)
    }

    pub fn raw_query(&self) -> Option<String> {
        self.builder.raw_query(&self.descriptor)
    }

    /// Renders the statement for the descriptor's own kind.
    pub fn sql(&self) -> Result<String> {
        let kind = self.descriptor.kind();
        let sql = match kind {
            QueryKind::Insert => self.insert_query(),
            QueryKind::Select => self.select_query(),
            QueryKind::Update => self.update_query(),
            QueryKind::Delete => self.delete_query(),
            QueryKind::Search => self.search_query(),
            QueryKind::Raw => self.raw_query(),
        };
        sql.ok_or_else(|| {
            SqlRepoError::InvalidDescriptor(format!(
                "cannot build {kind} query for `{}`: {}",
                self.descriptor.table(),
                missing_part(kind)
            ))
        })
    }

    /// Values to bind when executing [`sql`](Self::sql).
    pub fn bind_values(&self) -> ValueMap {
        self.descriptor.bind_values()
    }
}

fn missing_part(kind: QueryKind) -> &'static str {
    match kind {
        QueryKind::Insert => "no fields given",
        QueryKind::Update => "no fields to set besides the primary key",
        QueryKind::Delete => "no condition given",
        QueryKind::Raw => "empty statement",
        QueryKind::Select | QueryKind::Search => "rejected by the query builder",
    }
}

/// The standard SQL query builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlQueryBuilder {
    dialect: Dialect,
}

impl SqlQueryBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn selectors(selectors: &[String]) -> String {
        if selectors.is_empty() {
            "*".to_string()
        } else {
            selectors.join(", ")
        }
    }

    fn push_options(&self, sql: &mut String, options: &QueryOptions) {
        if let Some(order_by) = options.order_by.as_deref().map(str::trim) {
            if !order_by.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(order_by);
            }
        }

        if let Some(limit) = options.limit {
            sql.push_str(&self.dialect.limit(options.offset.unwrap_or(0), limit));
        }
    }
}

impl QueryBuilder for SqlQueryBuilder {
    fn insert_query(&self, descriptor: &QueryDescriptor) -> Option<String> {
        let QueryDescriptor::Insert(d) = descriptor else {
            return None;
        };
        if d.fields.is_empty() {
            return None;
        }

        let columns: Vec<&str> = d.fields.keys().collect();
        let placeholders: Vec<String> = columns.iter().map(|c| format!(":{c}")).collect();

        let returning = d
            .returning
            .as_deref()
            .map(|column| self.dialect.returning(column))
            .unwrap_or_default();

        Some(format!(
            "INSERT INTO {} ({}) VALUES ({}){returning}",
            d.table,
            columns.join(", "),
            placeholders.join(", ")
        ))
    }

    fn select_query(&self, descriptor: &QueryDescriptor) -> Option<String> {
        let QueryDescriptor::Select(d) = descriptor else {
            return None;
        };

        let mut sql = String::with_capacity(256);
        sql.push_str("SELECT ");
        sql.push_str(&Self::selectors(&d.selectors));
        sql.push_str(" FROM ");
        sql.push_str(&d.table);

        // Always present; empty conditions match every row.
        sql.push_str(" WHERE ");
        sql.push_str(&WhereClause::all_eq(d.conditions.keys()).build_sql(self.dialect));

        self.push_options(&mut sql, &d.options);
        Some(sql)
    }

    fn update_query(&self, descriptor: &QueryDescriptor) -> Option<String> {
        let QueryDescriptor::Update(d) = descriptor else {
            return None;
        };

        let assignments: Vec<String> = d
            .fields
            .keys()
            .filter(|column| *column != d.primary_key)
            .map(|column| format!("{column} = :{column}"))
            .collect();
        if assignments.is_empty() {
            return None;
        }

        let head = format!("UPDATE {} SET {}", d.table, assignments.join(", "));
        let sql = match d.scope {
            UpdateScope::AllRows => head,
            UpdateScope::ByPrimaryKey => {
                let predicate = WhereClause::eq(d.primary_key.as_str()).build_sql(self.dialect);
                self.dialect.single_row(&head, &d.table, &predicate)
            }
        };
        Some(sql)
    }

    fn delete_query(&self, descriptor: &QueryDescriptor) -> Option<String> {
        let QueryDescriptor::Delete(d) = descriptor else {
            return None;
        };

        // Only the first condition filters; the rest are bound but unused.
        let first = d.conditions.first_key()?;
        let head = format!("DELETE FROM {}", d.table);
        let predicate = WhereClause::eq(first).build_sql(self.dialect);

        let sql = match d.scope {
            DeleteScope::Single => self.dialect.single_row(&head, &d.table, &predicate),
            DeleteScope::Bulk => format!("{head} WHERE {predicate}"),
        };
        Some(sql)
    }

    fn search_query(&self, descriptor: &QueryDescriptor) -> Option<String> {
        let QueryDescriptor::Search(d) = descriptor else {
            return None;
        };

        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            Self::selectors(&d.selectors),
            d.table,
            WhereClause::all_like(d.conditions.keys()).build_sql(self.dialect)
        );
        self.push_options(&mut sql, &d.options);
        Some(sql)
    }

    fn raw_query(&self, descriptor: &QueryDescriptor) -> Option<String> {
        let QueryDescriptor::Raw(d) = descriptor else {
            return None;
        };
        if d.raw.trim().is_empty() {
            return None;
        }
        Some(d.raw.clone())
    }
}
