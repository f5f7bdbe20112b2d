use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::builders::{
    DeleteDescriptor, DeleteScope, InsertDescriptor, QueryBuilder, QueryDescriptor, QueryOptions,
    RawDescriptor, ScopedQuery, SearchDescriptor, SelectDescriptor, UpdateDescriptor,
    UpdateScope,
};
use crate::error::Result;
use crate::mapper::DataMapper;
use crate::traits::Table;
use crate::types::{QueryResult, RawQueryResult, Row, SqlValue, ValueMap};

/// The table a CRUD instance operates on.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaBinding {
    pub table: String,
    pub primary_key: String,
    /// Free-form settings carried along for custom CRUD implementations
    pub options: ValueMap,
}

impl SchemaBinding {
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            options: ValueMap::new(),
        }
    }

    pub fn with_options(mut self, options: ValueMap) -> Self {
        self.options = options;
        self
    }

    /// Binding for a [`Table`] implementation.
    pub fn of<T: Table>() -> Self {
        Self::new(T::qualified_name(), T::primary_key())
    }
}

/// Create/read/update/delete/search over one table.
///
/// Every method runs exactly one statement (open, prepare, bind, execute,
/// close) and passes lower-layer failures through unchanged. "Nothing
/// matched" is an ordinary outcome, never an error.
#[async_trait]
pub trait CrudOperations: Send + Sync {
    /// Table name
    fn schema(&self) -> &str;

    /// Primary key column
    fn schema_id(&self) -> &str;

    /// Key generated by the last insert.
    async fn last_id(&self) -> Result<i64>;

    /// Inserts one row; true iff exactly one row was affected.
    async fn create(&self, fields: ValueMap) -> Result<bool>;

    async fn read(
        &self,
        selectors: Vec<String>,
        conditions: ValueMap,
        parameters: ValueMap,
        options: QueryOptions,
    ) -> Result<Vec<Row>>;

    /// Updates the row whose primary key is `pk`; true iff exactly one row
    /// was affected.
    async fn update(&self, pk: SqlValue, fields: ValueMap) -> Result<bool>;

    /// Updates every row in the table and returns how many changed.
    async fn update_all(&self, fields: ValueMap) -> Result<u64>;

    /// Deletes at most one row matching the first condition; true iff exactly
    /// one row was removed.
    async fn delete(&self, conditions: ValueMap) -> Result<bool>;

    /// Deletes every row matching the first condition.
    async fn delete_bulk(&self, conditions: ValueMap) -> Result<u64>;

    /// Substring search with every condition as a `LIKE` term.
    async fn search(
        &self,
        selectors: Vec<String>,
        conditions: ValueMap,
        options: QueryOptions,
    ) -> Result<Vec<Row>>;

    /// Runs statement text as given, binding `conditions`.
    async fn raw(&self, raw: &str, conditions: ValueMap) -> Result<QueryResult>;
}

/// The standard [`CrudOperations`] implementation.
pub struct Crud {
    mapper: Mutex<DataMapper>,
    query_builder: Arc<dyn QueryBuilder>,
    schema: SchemaBinding,
}

impl Crud {
    pub fn new(
        mapper: DataMapper,
        query_builder: Arc<dyn QueryBuilder>,
        schema: SchemaBinding,
    ) -> Self {
        Self {
            mapper: Mutex::new(mapper),
            query_builder,
            schema,
        }
    }

    pub fn binding(&self) -> &SchemaBinding {
        &self.schema
    }

    /// Renders and executes one descriptor, handing back the mapper that
    /// holds its outcome.
    async fn run(&self, descriptor: QueryDescriptor) -> Result<MutexGuard<'_, DataMapper>> {
        let (sql, values, is_search) = {
            let scoped = ScopedQuery::new(self.query_builder.as_ref(), descriptor);
            (
                scoped.sql()?,
                scoped.bind_values(),
                scoped.descriptor().is_search(),
            )
        };

        let mut mapper = self.mapper.lock().await;
        if is_search {
            mapper.persist_search(&sql, &values).await?;
        } else {
            mapper.persist(&sql, &values).await?;
        }
        Ok(mapper)
    }

    fn table(&self) -> String {
        self.schema.table.clone()
    }
}

#[async_trait]
impl CrudOperations for Crud {
    fn schema(&self) -> &str {
        &self.schema.table
    }

    fn schema_id(&self) -> &str {
        &self.schema.primary_key
    }

    async fn last_id(&self) -> Result<i64> {
        self.mapper.lock().await.last_id()
    }

    async fn create(&self, fields: ValueMap) -> Result<bool> {
        let mapper = self
            .run(QueryDescriptor::Insert(InsertDescriptor {
                table: self.table(),
                fields,
                returning: Some(self.schema.primary_key.clone()),
            }))
            .await?;
        Ok(mapper.rows_count() == 1)
    }

    async fn read(
        &self,
        selectors: Vec<String>,
        conditions: ValueMap,
        parameters: ValueMap,
        options: QueryOptions,
    ) -> Result<Vec<Row>> {
        let mapper = self
            .run(QueryDescriptor::Select(SelectDescriptor {
                table: self.table(),
                selectors,
                conditions,
                parameters,
                options,
            }))
            .await?;
        Ok(mapper.results())
    }

    async fn update(&self, pk: SqlValue, mut fields: ValueMap) -> Result<bool> {
        fields.insert(self.schema.primary_key.as_str(), pk);
        let mapper = self
            .run(QueryDescriptor::Update(UpdateDescriptor {
                table: self.table(),
                primary_key: self.schema.primary_key.clone(),
                fields,
                scope: UpdateScope::ByPrimaryKey,
            }))
            .await?;
        Ok(mapper.rows_count() == 1)
    }

    async fn update_all(&self, fields: ValueMap) -> Result<u64> {
        let mapper = self
            .run(QueryDescriptor::Update(UpdateDescriptor {
                table: self.table(),
                primary_key: self.schema.primary_key.clone(),
                fields,
                scope: UpdateScope::AllRows,
            }))
            .await?;
        Ok(mapper.rows_count())
    }

    async fn delete(&self, conditions: ValueMap) -> Result<bool> {
        let mapper = self
            .run(QueryDescriptor::Delete(DeleteDescriptor {
                table: self.table(),
                conditions,
                scope: DeleteScope::Single,
            }))
            .await?;
        Ok(mapper.rows_count() == 1)
    }

    async fn delete_bulk(&self, conditions: ValueMap) -> Result<u64> {
        let mapper = self
            .run(QueryDescriptor::Delete(DeleteDescriptor {
                table: self.table(),
                conditions,
                scope: DeleteScope::Bulk,
            }))
            .await?;
        Ok(mapper.rows_count())
    }

    async fn search(
        &self,
        selectors: Vec<String>,
        conditions: ValueMap,
        options: QueryOptions,
    ) -> Result<Vec<Row>> {
        let mapper = self
            .run(QueryDescriptor::Search(SearchDescriptor {
                table: self.table(),
                selectors,
                conditions,
                options,
            }))
            .await?;
        Ok(mapper.results())
    }

    async fn raw(&self, raw: &str, conditions: ValueMap) -> Result<QueryResult> {
        let mut mapper = self
            .run(QueryDescriptor::Raw(RawDescriptor {
                table: self.table(),
                raw: raw.to_string(),
                conditions,
            }))
            .await?;
        Ok(mapper
            .take_outcome()
            .unwrap_or_else(|| QueryResult::from_raw(RawQueryResult::empty())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::SqlQueryBuilder;
    use crate::drivers::{InMemoryTestConnection, InMemoryTestDriver, InMemoryTestResponseBuilder};
    use crate::error::SqlRepoError;
    use crate::traits::DatabaseConnection;

    fn users_crud(driver: InMemoryTestDriver) -> (Crud, Arc<InMemoryTestDriver>) {
        let driver = Arc::new(driver);
        let connection: Arc<dyn DatabaseConnection> =
            Arc::new(InMemoryTestConnection::new(Arc::clone(&driver)));
        let crud = Crud::new(
            DataMapper::new(connection),
            Arc::new(SqlQueryBuilder::default()),
            SchemaBinding::new("users", "id"),
        );
        (crud, driver)
    }

    #[tokio::test]
    async fn test_create_ann_lee() {
        let (crud, driver) =
            users_crud(InMemoryTestDriver::new().with_response(RawQueryResult::affected(1, Some(1))));

        let created = crud
            .create(
                ValueMap::new()
                    .with("first_name", "Ann")
                    .with("last_name", "Lee"),
            )
            .await
            .unwrap();

        assert!(created);
        assert_eq!(crud.last_id().await.unwrap(), 1);
        driver.assert_last_query(
            "INSERT INTO users (first_name, last_name) VALUES (:first_name, :last_name)",
            &[
                ("first_name", SqlValue::from("Ann")),
                ("last_name", SqlValue::from("Lee")),
            ],
        );
    }

    #[tokio::test]
    async fn test_create_is_false_unless_exactly_one_row() {
        let (crud, _) =
            users_crud(InMemoryTestDriver::new().with_response(RawQueryResult::affected(2, None)));
        assert!(!crud
            .create(ValueMap::from([("first_name", "Ann")]))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_read_returns_rows_in_order() {
        let (crud, driver) = users_crud(
            InMemoryTestDriver::new().with_response(
                InMemoryTestResponseBuilder::new()
                    .columns(&["id", "first_name"])
                    .row([SqlValue::from(1), "Ann".into()])
                    .row([SqlValue::from(2), "Bob".into()])
                    .build(),
            ),
        );

        let rows = crud
            .read(
                vec!["id".into(), "first_name".into()],
                ValueMap::new(),
                ValueMap::new(),
                QueryOptions::default().order_by("id ASC"),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("first_name").unwrap(), &SqlValue::from("Bob"));
        driver.assert_last_query(
            "SELECT id, first_name FROM users WHERE 1 ORDER BY id ASC",
            &[],
        );
    }

    #[tokio::test]
    async fn test_read_nothing_is_empty_not_error() {
        let (crud, _) = users_crud(InMemoryTestDriver::new());
        let rows = crud
            .read(
                vec![],
                ValueMap::from([("id", 99)]),
                ValueMap::new(),
                QueryOptions::default(),
            )
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_update_binds_primary_key() {
        let (crud, driver) =
            users_crud(InMemoryTestDriver::new().with_response(RawQueryResult::affected(1, None)));

        let updated = crud
            .update(SqlValue::from(5), ValueMap::from([("first_name", "Ann")]))
            .await
            .unwrap();

        assert!(updated);
        driver.assert_last_query(
            "UPDATE users SET first_name = :first_name WHERE id = :id LIMIT 1",
            &[("first_name", SqlValue::from("Ann")), ("id", SqlValue::from(5))],
        );
    }

    #[tokio::test]
    async fn test_update_all_has_no_filter() {
        let (crud, driver) =
            users_crud(InMemoryTestDriver::new().with_response(RawQueryResult::affected(3, None)));

        let changed = crud
            .update_all(ValueMap::from([("active", false)]))
            .await
            .unwrap();

        assert_eq!(changed, 3);
        driver.assert_last_query(
            "UPDATE users SET active = :active",
            &[("active", SqlValue::Bool(false))],
        );
    }

    #[tokio::test]
    async fn test_delete_and_bulk_delete() {
        let (crud, driver) = users_crud(InMemoryTestDriver::new().with_responses([
            RawQueryResult::affected(1, None),
            RawQueryResult::affected(4, None),
        ]));

        assert!(crud.delete(ValueMap::from([("id", 7)])).await.unwrap());
        driver.assert_last_query(
            "DELETE FROM users WHERE id = :id LIMIT 1",
            &[("id", SqlValue::from(7))],
        );

        let removed = crud
            .delete_bulk(ValueMap::from([("last_name", "Lee")]))
            .await
            .unwrap();
        assert_eq!(removed, 4);
        driver.assert_last_query(
            "DELETE FROM users WHERE last_name = :last_name",
            &[("last_name", SqlValue::from("Lee"))],
        );
    }

    #[tokio::test]
    async fn test_delete_without_conditions_never_reaches_storage() {
        let (crud, driver) = users_crud(InMemoryTestDriver::new());

        let err = crud.delete(ValueMap::new()).await.unwrap_err();

        assert!(matches!(err, SqlRepoError::InvalidDescriptor(_)));
        driver.assert_query_count(0);
    }

    #[tokio::test]
    async fn test_search_wraps_terms() {
        let (crud, driver) = users_crud(InMemoryTestDriver::new());

        crud.search(
            vec![],
            ValueMap::from([("last_name", "Le")]),
            QueryOptions::default().limit(10),
        )
        .await
        .unwrap();

        driver.assert_last_query(
            "SELECT * FROM users WHERE last_name LIKE :last_name LIMIT 0, 10",
            &[("last_name", SqlValue::from("%Le%"))],
        );
    }

    #[tokio::test]
    async fn test_raw_returns_unnormalized_result() {
        let (crud, driver) = users_crud(
            InMemoryTestDriver::new().with_response(
                InMemoryTestResponseBuilder::new()
                    .columns(&["total"])
                    .row([3])
                    .build(),
            ),
        );

        let result = crud
            .raw(
                "SELECT COUNT(*) AS total FROM users WHERE last_name = :last_name",
                ValueMap::from([("last_name", "Lee")]),
            )
            .await
            .unwrap();

        assert_eq!(result.rows_affected(), 1);
        assert_eq!(result.columns(), ["total".to_string()]);
        driver.assert_query_count(1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_reraised() {
        let (crud, _) = users_crud(InMemoryTestDriver::new().with_failure("no such table: users"));

        let err = crud
            .create(ValueMap::from([("first_name", "Ann")]))
            .await
            .unwrap_err();

        assert!(matches!(err, SqlRepoError::StorageExecution(m) if m == "no such table: users"));
    }

    #[test]
    fn test_schema_binding_from_table() {
        struct Accounts;
        impl Table for Accounts {
            fn table_name() -> &'static str {
                "accounts"
            }
            fn schema() -> Option<&'static str> {
                Some("billing")
            }
            fn primary_key() -> &'static str {
                "account_id"
            }
        }

        assert_eq!(
            SchemaBinding::of::<Accounts>(),
            SchemaBinding::new("billing.accounts", "account_id")
        );
    }

    #[test]
    fn test_schema_binding_carries_options() {
        let binding = SchemaBinding::new("users", "id")
            .with_options(ValueMap::from([("soft_delete", true)]));
        assert_eq!(binding.options.get("soft_delete"), Some(&SqlValue::Bool(true)));
        assert!(SchemaBinding::new("users", "id").options.is_empty());
    }
}
