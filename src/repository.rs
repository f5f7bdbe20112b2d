use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::builders::QueryOptions;
use crate::crud::CrudOperations;
use crate::entity_manager::EntityManager;
use crate::error::{NotFound, Result, SqlRepoError};
use crate::types::{Row, SqlValue, ValueMap};

/// Page request for [`DataRepository::find_with_search_and_paging`].
///
/// Pages are 0-based. `order_by` is required: without a stable ordering,
/// consecutive pages may overlap or skip rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paging {
    pub page: u64,
    pub size: u64,
    pub order_by: String,
}

impl Paging {
    pub fn new(page: u64, size: u64, order_by: impl Into<String>) -> Self {
        Self {
            page,
            size,
            order_by: order_by.into(),
        }
    }

    /// Rows skipped before this page; `None` when it does not fit in a `u64`.
    pub fn offset(&self) -> Option<u64> {
        self.page.checked_mul(self.size)
    }

    /// Checks the request and returns its offset.
    fn validate(&self) -> Result<u64> {
        if self.order_by.trim().is_empty() {
            return Err(SqlRepoError::InvalidArgument(
                "paging requires an explicit order_by".into(),
            ));
        }
        if self.size == 0 {
            return Err(SqlRepoError::InvalidArgument(
                "page size must be at least 1".into(),
            ));
        }
        self.offset().ok_or_else(|| {
            SqlRepoError::InvalidArgument(format!(
                "page {} of size {} is out of range",
                self.page, self.size
            ))
        })
    }
}

/// A page of results with pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, paging: &Paging, total_elements: u64) -> Self {
        let total_pages = if paging.size == 0 {
            0
        } else {
            total_elements.div_ceil(paging.size)
        };
        Self {
            content,
            page: paging.page,
            size: paging.size,
            total_elements,
            total_pages,
        }
    }
}

/// Result of [`DataRepository::find_and_return`].
#[derive(Debug, Clone)]
pub struct Lookup {
    table: String,
    column: String,
    id: SqlValue,
    row: Option<Row>,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        self.row.is_some()
    }

    pub fn row(&self) -> Option<&Row> {
        self.row.as_ref()
    }

    pub fn into_row(self) -> Option<Row> {
        self.row
    }

    /// The row, or [`NotFound`] when there was none.
    pub fn or_404(self) -> std::result::Result<Row, NotFound> {
        self.row.ok_or(NotFound {
            table: self.table,
            column: self.column,
            id: self.id.to_string(),
        })
    }
}

/// Application-facing queries over one table.
#[derive(Clone)]
pub struct DataRepository {
    em: EntityManager,
}

impl DataRepository {
    pub fn new(em: EntityManager) -> Self {
        Self { em }
    }

    pub fn entity_manager(&self) -> &EntityManager {
        &self.em
    }

    fn crud(&self) -> &Arc<dyn CrudOperations> {
        self.em.crud()
    }

    fn by_id(&self, id: SqlValue) -> ValueMap {
        ValueMap::new().with(self.crud().schema_id(), id)
    }

    fn ensure_id(id: &SqlValue) -> Result<()> {
        if id.is_empty_sentinel() {
            return Err(SqlRepoError::InvalidArgument(format!(
                "`{id}` is not a usable id"
            )));
        }
        Ok(())
    }

    /// Row with primary key `id`.
    ///
    /// # Errors
    ///
    /// [`SqlRepoError::InvalidArgument`] for a zero or empty id, before any
    /// storage access.
    pub async fn find(&self, id: impl Into<SqlValue>) -> Result<Option<Row>> {
        let id = id.into();
        Self::ensure_id(&id)?;
        self.find_one_by(self.by_id(id)).await
    }

    /// First row matching every condition.
    pub async fn find_one_by(&self, conditions: ValueMap) -> Result<Option<Row>> {
        let rows = self
            .crud()
            .read(Vec::new(), conditions, ValueMap::new(), QueryOptions::default())
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn find_all(&self) -> Result<Vec<Row>> {
        self.crud()
            .read(Vec::new(), ValueMap::new(), ValueMap::new(), QueryOptions::default())
            .await
    }

    pub async fn find_by(
        &self,
        selectors: Vec<String>,
        conditions: ValueMap,
        parameters: ValueMap,
        options: QueryOptions,
    ) -> Result<Vec<Row>> {
        self.crud()
            .read(selectors, conditions, parameters, options)
            .await
    }

    pub async fn find_by_search(
        &self,
        selectors: Vec<String>,
        conditions: ValueMap,
        options: QueryOptions,
    ) -> Result<Vec<Row>> {
        self.crud().search(selectors, conditions, options).await
    }

    /// Deletes the row matching `conditions` if it exists.
    ///
    /// Returns `false` without issuing a DELETE when nothing matches.
    pub async fn find_by_id_and_delete(&self, conditions: ValueMap) -> Result<bool> {
        if conditions.is_empty() {
            return Err(SqlRepoError::InvalidArgument(
                "delete requires at least one condition".into(),
            ));
        }

        if self.find_one_by(conditions.clone()).await?.is_none() {
            debug!(table = self.crud().schema(), "nothing to delete");
            return Ok(false);
        }
        self.crud().delete(conditions).await
    }

    /// Updates the row with primary key `id` if it exists.
    ///
    /// Returns `false` without issuing an UPDATE when there is no such row.
    pub async fn find_by_id_and_update(
        &self,
        id: impl Into<SqlValue>,
        fields: ValueMap,
    ) -> Result<bool> {
        let id = id.into();
        Self::ensure_id(&id)?;
        if fields.is_empty() {
            return Err(SqlRepoError::InvalidArgument(
                "update requires at least one field".into(),
            ));
        }

        if self.find_one_by(self.by_id(id.clone())).await?.is_none() {
            debug!(table = self.crud().schema(), id = %id, "nothing to update");
            return Ok(false);
        }
        self.crud().update(id, fields).await
    }

    /// One page of search results, plus the total match count.
    pub async fn find_with_search_and_paging(
        &self,
        filters: ValueMap,
        paging: &Paging,
    ) -> Result<Page<Row>> {
        let offset = paging.validate()?;

        let total = self
            .crud()
            .search(
                vec!["COUNT(*) AS total".to_string()],
                filters.clone(),
                QueryOptions::default(),
            )
            .await?
            .first()
            .and_then(|row| row.try_get("total"))
            .and_then(SqlValue::as_i64)
            .unwrap_or(0);

        let options = QueryOptions::default()
            .order_by(paging.order_by.as_str())
            .limit(paging.size)
            .offset(offset);
        let content = self
            .crud()
            .search(Vec::new(), filters, options)
            .await?;

        Ok(Page::new(content, paging, total.max(0) as u64))
    }

    /// Looks up `id`, leaving the caller to decide how to treat a miss.
    ///
    /// An empty `selectors` returns every column.
    pub async fn find_and_return(
        &self,
        id: impl Into<SqlValue>,
        selectors: Vec<String>,
    ) -> Result<Lookup> {
        let id = id.into();
        Self::ensure_id(&id)?;

        let rows = self
            .crud()
            .read(
                selectors,
                self.by_id(id.clone()),
                ValueMap::new(),
                QueryOptions::default(),
            )
            .await?;

        Ok(Lookup {
            table: self.crud().schema().to_string(),
            column: self.crud().schema_id().to_string(),
            id,
            row: rows.into_iter().next(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::SqlQueryBuilder;
    use crate::crud::{Crud, SchemaBinding};
    use crate::drivers::{InMemoryTestConnection, InMemoryTestDriver, InMemoryTestResponseBuilder};
    use crate::mapper::DataMapper;
    use crate::traits::DatabaseConnection;
    use crate::types::RawQueryResult;

    fn users_repository(driver: InMemoryTestDriver) -> (DataRepository, Arc<InMemoryTestDriver>) {
        let driver = Arc::new(driver);
        let connection: Arc<dyn DatabaseConnection> =
            Arc::new(InMemoryTestConnection::new(Arc::clone(&driver)));
        let crud = Crud::new(
            DataMapper::new(connection),
            Arc::new(SqlQueryBuilder::default()),
            SchemaBinding::new("users", "id"),
        );
        (
            DataRepository::new(EntityManager::new(Arc::new(crud))),
            driver,
        )
    }

    fn ann() -> RawQueryResult {
        InMemoryTestResponseBuilder::new()
            .columns(&["id", "first_name"])
            .row([SqlValue::from(1), "Ann".into()])
            .build()
    }

    #[tokio::test]
    async fn test_find_zero_fails_before_storage() {
        let (repository, driver) = users_repository(InMemoryTestDriver::new());

        for id in [SqlValue::from(0), SqlValue::from(""), SqlValue::Null] {
            let err = repository.find(id).await.unwrap_err();
            assert!(matches!(err, SqlRepoError::InvalidArgument(_)));
        }
        assert!(driver.prepared_statements().is_empty());
        driver.assert_query_count(0);
    }

    #[tokio::test]
    async fn test_find_by_primary_key() {
        let (repository, driver) = users_repository(InMemoryTestDriver::new().with_response(ann()));

        let row = repository.find(1).await.unwrap().unwrap();

        assert_eq!(row.get("first_name").unwrap(), &SqlValue::from("Ann"));
        driver.assert_last_query(
            "SELECT * FROM users WHERE id = :id",
            &[("id", SqlValue::from(1))],
        );
    }

    #[tokio::test]
    async fn test_find_all_matches_everything() {
        let (repository, driver) = users_repository(InMemoryTestDriver::new());
        assert!(repository.find_all().await.unwrap().is_empty());
        driver.assert_last_query("SELECT * FROM users WHERE 1", &[]);
    }

    #[tokio::test]
    async fn test_delete_of_missing_row_issues_no_delete() {
        let (repository, driver) = users_repository(InMemoryTestDriver::new());

        let deleted = repository
            .find_by_id_and_delete(ValueMap::from([("id", 42)]))
            .await
            .unwrap();

        assert!(!deleted);
        driver.assert_query_count(1);
        assert!(driver.last_query().unwrap().sql.starts_with("SELECT"));
    }

    #[tokio::test]
    async fn test_delete_of_existing_row() {
        let (repository, driver) = users_repository(
            InMemoryTestDriver::new()
                .with_response(ann())
                .with_response(RawQueryResult::affected(1, None)),
        );

        assert!(repository
            .find_by_id_and_delete(ValueMap::from([("id", 1)]))
            .await
            .unwrap());
        driver.assert_last_query(
            "DELETE FROM users WHERE id = :id LIMIT 1",
            &[("id", SqlValue::from(1))],
        );
    }

    #[tokio::test]
    async fn test_delete_requires_conditions() {
        let (repository, driver) = users_repository(InMemoryTestDriver::new());
        assert!(matches!(
            repository.find_by_id_and_delete(ValueMap::new()).await,
            Err(SqlRepoError::InvalidArgument(_))
        ));
        driver.assert_query_count(0);
    }

    #[tokio::test]
    async fn test_update_is_existence_gated() {
        let (repository, driver) = users_repository(
            InMemoryTestDriver::new()
                .with_response(RawQueryResult::empty())
                .with_response(ann())
                .with_response(RawQueryResult::affected(1, None)),
        );
        let fields = ValueMap::from([("first_name", "Anne")]);

        assert!(!repository
            .find_by_id_and_update(9, fields.clone())
            .await
            .unwrap());
        driver.assert_query_count(1);

        assert!(repository.find_by_id_and_update(1, fields).await.unwrap());
        driver.assert_last_query(
            "UPDATE users SET first_name = :first_name WHERE id = :id LIMIT 1",
            &[
                ("first_name", SqlValue::from("Anne")),
                ("id", SqlValue::from(1)),
            ],
        );
    }

    #[tokio::test]
    async fn test_update_rejects_empty_fields() {
        let (repository, _) = users_repository(InMemoryTestDriver::new());
        assert!(matches!(
            repository.find_by_id_and_update(1, ValueMap::new()).await,
            Err(SqlRepoError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_paging_requires_order_by() {
        let (repository, driver) = users_repository(InMemoryTestDriver::new());

        let err = repository
            .find_with_search_and_paging(ValueMap::new(), &Paging::new(0, 10, " "))
            .await
            .unwrap_err();

        assert!(matches!(err, SqlRepoError::InvalidArgument(_)));
        driver.assert_query_count(0);
    }

    #[tokio::test]
    async fn test_paging_rejects_offset_overflow() {
        let (repository, driver) = users_repository(InMemoryTestDriver::new());

        assert_eq!(Paging::new(u64::MAX, 2, "id").offset(), None);
        assert_eq!(Paging::new(3, 10, "id").offset(), Some(30));

        let err = repository
            .find_with_search_and_paging(ValueMap::new(), &Paging::new(u64::MAX, 2, "id"))
            .await
            .unwrap_err();

        assert!(matches!(err, SqlRepoError::InvalidArgument(_)));
        driver.assert_query_count(0);
    }

    #[tokio::test]
    async fn test_paging_counts_then_fetches_page() {
        let (repository, driver) = users_repository(
            InMemoryTestDriver::new()
                .with_response(
                    InMemoryTestResponseBuilder::new()
                        .columns(&["total"])
                        .row([SqlValue::Int64(21)])
                        .build(),
                )
                .with_response(ann()),
        );

        let page = repository
            .find_with_search_and_paging(
                ValueMap::from([("last_name", "Le")]),
                &Paging::new(2, 10, "id ASC"),
            )
            .await
            .unwrap();

        assert_eq!(page.total_elements, 21);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);
        assert_eq!(page.content.len(), 1);

        let queries = driver.recorded_queries();
        assert_eq!(
            queries[0].sql,
            "SELECT COUNT(*) AS total FROM users WHERE last_name LIKE :last_name"
        );
        driver.assert_last_query(
            "SELECT * FROM users WHERE last_name LIKE :last_name ORDER BY id ASC LIMIT 20, 10",
            &[("last_name", SqlValue::from("%Le%"))],
        );
    }

    #[tokio::test]
    async fn test_find_and_return_or_404() {
        let (repository, _) = users_repository(InMemoryTestDriver::new().with_response(ann()));

        let found = repository
            .find_and_return(1, vec!["first_name".into()])
            .await
            .unwrap();
        assert!(found.is_found());
        assert!(found.or_404().is_ok());

        let missing = repository.find_and_return(2, vec![]).await.unwrap();
        let not_found = missing.or_404().unwrap_err();
        assert_eq!(not_found.table, "users");
        assert_eq!(not_found.id, "2");
    }
}
