use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{Result, SqlRepoError};
use crate::types::ValueMap;

/// The six operation kinds a descriptor can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Insert,
    Select,
    Update,
    Delete,
    Search,
    Raw,
}

impl QueryKind {
    pub const ALL: [QueryKind; 6] = [
        QueryKind::Insert,
        QueryKind::Select,
        QueryKind::Update,
        QueryKind::Delete,
        QueryKind::Search,
        QueryKind::Raw,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Insert => "insert",
            QueryKind::Select => "select",
            QueryKind::Update => "update",
            QueryKind::Delete => "delete",
            QueryKind::Search => "search",
            QueryKind::Raw => "raw",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = SqlRepoError;

    fn from_str(s: &str) -> Result<Self> {
        QueryKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SqlRepoError::InvalidDescriptor(format!("unknown query type `{s}`")))
    }
}

/// ORDER BY / LIMIT / OFFSET shared by select and search.
///
/// There is no default ordering: callers paging through results must
/// supply `order_by` themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Raw ORDER BY text, e.g. `last_name ASC`
    pub order_by: Option<String>,
    pub limit: Option<u64>,
    /// Ignored unless `limit` is set
    pub offset: Option<u64>,
}

impl QueryOptions {
    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertDescriptor {
    pub table: String,
    pub fields: ValueMap,
    /// Generated column to report back, on dialects that return it with the
    /// INSERT itself
    pub returning: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectDescriptor {
    pub table: String,
    /// Columns to return; empty selects `*`
    pub selectors: Vec<String>,
    pub conditions: ValueMap,
    /// Extra values bound alongside the conditions
    pub parameters: ValueMap,
    pub options: QueryOptions,
}

/// Which rows an UPDATE touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdateScope {
    /// At most the one row whose primary key matches
    #[default]
    ByPrimaryKey,
    /// Every row in the table; must be asked for explicitly
    AllRows,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDescriptor {
    pub table: String,
    pub primary_key: String,
    /// New column values. For [`UpdateScope::ByPrimaryKey`] this also carries
    /// the primary key value, which is never written to the SET list.
    pub fields: ValueMap,
    pub scope: UpdateScope,
}

/// Which rows a DELETE may remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteScope {
    #[default]
    Single,
    Bulk,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteDescriptor {
    pub table: String,
    /// Only the first key filters the DELETE
    pub conditions: ValueMap,
    pub scope: DeleteScope,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchDescriptor {
    pub table: String,
    pub selectors: Vec<String>,
    /// Column -> term; terms are wrapped in `%` wildcards when bound
    pub conditions: ValueMap,
    pub options: QueryOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDescriptor {
    pub table: String,
    pub raw: String,
    pub conditions: ValueMap,
}

/// Structured description of one SQL operation, prior to text generation.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryDescriptor {
    Insert(InsertDescriptor),
    Select(SelectDescriptor),
    Update(UpdateDescriptor),
    Delete(DeleteDescriptor),
    Search(SearchDescriptor),
    Raw(RawDescriptor),
}

impl QueryDescriptor {
    pub fn kind(&self) -> QueryKind {
        match self {
            QueryDescriptor::Insert(_) => QueryKind::Insert,
            QueryDescriptor::Select(_) => QueryKind::Select,
            QueryDescriptor::Update(_) => QueryKind::Update,
            QueryDescriptor::Delete(_) => QueryKind::Delete,
            QueryDescriptor::Search(_) => QueryKind::Search,
            QueryDescriptor::Raw(_) => QueryKind::Raw,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            QueryDescriptor::Insert(d) => &d.table,
            QueryDescriptor::Select(d) => &d.table,
            QueryDescriptor::Update(d) => &d.table,
            QueryDescriptor::Delete(d) => &d.table,
            QueryDescriptor::Search(d) => &d.table,
            QueryDescriptor::Raw(d) => &d.table,
        }
    }

    /// Values to bind when executing the rendered statement.
    pub fn bind_values(&self) -> ValueMap {
        match self {
            QueryDescriptor::Insert(d) => d.fields.clone(),
            QueryDescriptor::Select(d) => d.conditions.merged(&d.parameters),
            QueryDescriptor::Update(d) => match d.scope {
                UpdateScope::ByPrimaryKey => d.fields.clone(),
                UpdateScope::AllRows => {
                    let mut fields = d.fields.clone();
                    fields.remove(&d.primary_key);
                    fields
                }
            },
            QueryDescriptor::Delete(d) => d.conditions.clone(),
            QueryDescriptor::Search(d) => d.conditions.clone(),
            QueryDescriptor::Raw(d) => d.conditions.clone(),
        }
    }

    /// True when the bound values are search terms.
    pub fn is_search(&self) -> bool {
        matches!(self, QueryDescriptor::Search(_))
    }

    /// Builds a descriptor from the string-keyed form:
    /// `table, type, selectors, conditions, parameters, fields, pk, raw,
    /// orderBy, limit, offset`, plus the `allRows` / `bulk` opt-ins.
    ///
    /// Absent keys take their defaults (empty maps and lists, no ordering,
    /// no limit, primary key `id`).
    pub fn from_json(value: &Value) -> Result<Self> {
        let args = value.as_object().ok_or_else(|| {
            SqlRepoError::TypeMismatch(format!("descriptor must be a JSON object, got {value}"))
        })?;

        let kind: QueryKind = match args.get("type") {
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(SqlRepoError::InvalidDescriptor(format!(
                    "query type must be a string, got {other}"
                )))
            }
            None => {
                return Err(SqlRepoError::InvalidDescriptor(
                    "query type is missing".to_string(),
                ))
            }
        };

        let table = json_str(args, "table")?.unwrap_or_default();
        if table.is_empty() {
            return Err(SqlRepoError::InvalidDescriptor(
                "table is missing".to_string(),
            ));
        }

        let descriptor = match kind {
            QueryKind::Insert => QueryDescriptor::Insert(InsertDescriptor {
                table,
                fields: json_map(args, "fields")?,
                returning: json_str(args, "returning")?,
            }),
            QueryKind::Select => QueryDescriptor::Select(SelectDescriptor {
                table,
                selectors: json_selectors(args)?,
                conditions: json_map(args, "conditions")?,
                parameters: json_map(args, "parameters")?,
                options: json_options(args)?,
            }),
            QueryKind::Update => QueryDescriptor::Update(UpdateDescriptor {
                table,
                primary_key: json_str(args, "pk")?.unwrap_or_else(|| "id".to_string()),
                fields: json_map(args, "fields")?,
                scope: if json_bool(args, "allRows")? {
                    UpdateScope::AllRows
                } else {
                    UpdateScope::ByPrimaryKey
                },
            }),
            QueryKind::Delete => QueryDescriptor::Delete(DeleteDescriptor {
                table,
                conditions: json_map(args, "conditions")?,
                scope: if json_bool(args, "bulk")? {
                    DeleteScope::Bulk
                } else {
                    DeleteScope::Single
                },
            }),
            QueryKind::Search => QueryDescriptor::Search(SearchDescriptor {
                table,
                selectors: json_selectors(args)?,
                conditions: json_map(args, "conditions")?,
                options: json_options(args)?,
            }),
            QueryKind::Raw => QueryDescriptor::Raw(RawDescriptor {
                table,
                raw: json_str(args, "raw")?.unwrap_or_default(),
                conditions: json_map(args, "conditions")?,
            }),
        };

        Ok(descriptor)
    }
}

fn json_str(args: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(SqlRepoError::TypeMismatch(format!(
            "`{key}` must be a string, got {other}"
        ))),
    }
}

fn json_bool(args: &Map<String, Value>, key: &str) -> Result<bool> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(SqlRepoError::TypeMismatch(format!(
            "`{key}` must be a boolean, got {other}"
        ))),
    }
}

fn json_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            SqlRepoError::TypeMismatch(format!(
                "`{key}` must be a non-negative integer, got {value}"
            ))
        }),
    }
}

fn json_map(args: &Map<String, Value>, key: &str) -> Result<ValueMap> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(ValueMap::new()),
        Some(value) => ValueMap::try_from(value),
    }
}

fn json_selectors(args: &Map<String, Value>) -> Result<Vec<String>> {
    match args.get("selectors") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    SqlRepoError::TypeMismatch(format!("selector must be a string, got {item}"))
                })
            })
            .collect(),
        Some(other) => Err(SqlRepoError::TypeMismatch(format!(
            "`selectors` must be an array, got {other}"
        ))),
    }
}

fn json_options(args: &Map<String, Value>) -> Result<QueryOptions> {
    Ok(QueryOptions {
        order_by: json_str(args, "orderBy")?,
        limit: json_u64(args, "limit")?,
        offset: json_u64(args, "offset")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlValue;
    use serde_json::json;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in QueryKind::ALL {
            assert_eq!(kind.as_str().parse::<QueryKind>().unwrap(), kind);
        }
        assert!(matches!(
            "upsert".parse::<QueryKind>(),
            Err(SqlRepoError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_from_json_applies_defaults() {
        let descriptor = QueryDescriptor::from_json(&json!({
            "table": "users",
            "type": "select",
        }))
        .unwrap();

        match descriptor {
            QueryDescriptor::Select(d) => {
                assert_eq!(d.table, "users");
                assert!(d.selectors.is_empty());
                assert!(d.conditions.is_empty());
                assert_eq!(d.options, QueryOptions::default());
            }
            other => panic!("expected select descriptor, got {other:?}"),
        }
    }

    #[test]
    fn test_from_json_reads_every_key() {
        let descriptor = QueryDescriptor::from_json(&json!({
            "table": "users",
            "type": "search",
            "selectors": ["id", "email"],
            "conditions": {"email": "example"},
            "orderBy": "id DESC",
            "limit": 5,
            "offset": 10,
        }))
        .unwrap();

        let QueryDescriptor::Search(d) = descriptor else {
            panic!("expected search descriptor");
        };
        assert_eq!(d.selectors, vec!["id", "email"]);
        assert_eq!(d.conditions.get("email"), Some(&SqlValue::from("example")));
        assert_eq!(d.options.order_by.as_deref(), Some("id DESC"));
        assert_eq!(d.options.limit, Some(5));
        assert_eq!(d.options.offset, Some(10));
    }

    #[test]
    fn test_from_json_rejects_unknown_type() {
        let err = QueryDescriptor::from_json(&json!({"table": "users", "type": "merge"}))
            .unwrap_err();
        assert!(matches!(err, SqlRepoError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_from_json_rejects_non_mapping_fields() {
        let err = QueryDescriptor::from_json(&json!({
            "table": "users",
            "type": "insert",
            "fields": ["Ann", "Lee"],
        }))
        .unwrap_err();
        assert!(matches!(err, SqlRepoError::TypeMismatch(_)));
    }

    #[test]
    fn test_update_bulk_flag_is_opt_in() {
        let single = QueryDescriptor::from_json(&json!({
            "table": "users", "type": "update", "fields": {"name": "x"}
        }))
        .unwrap();
        let bulk = QueryDescriptor::from_json(&json!({
            "table": "users", "type": "update", "fields": {"name": "x"}, "allRows": true
        }))
        .unwrap();

        assert!(matches!(
            single,
            QueryDescriptor::Update(UpdateDescriptor { scope: UpdateScope::ByPrimaryKey, .. })
        ));
        assert!(matches!(
            bulk,
            QueryDescriptor::Update(UpdateDescriptor { scope: UpdateScope::AllRows, .. })
        ));
    }

    #[test]
    fn test_all_rows_update_does_not_bind_primary_key() {
        let descriptor = QueryDescriptor::Update(UpdateDescriptor {
            table: "users".to_string(),
            primary_key: "id".to_string(),
            fields: ValueMap::from([("id", 0), ("active", 1)]),
            scope: UpdateScope::AllRows,
        });
        let keys: Vec<String> = descriptor.bind_values().keys().map(String::from).collect();
        assert_eq!(keys, vec!["active"]);
    }
}
