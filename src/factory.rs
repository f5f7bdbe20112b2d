//! Keyed registries that assemble the pipeline: storage connection, query
//! builder, CRUD and repository.
//!
//! Each factory starts with the built-in entries registered and accepts
//! more through `register`. Unknown keys fail with
//! [`SqlRepoError::Configuration`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::builders::{Dialect, QueryBuilder, SqlQueryBuilder};
use crate::config::DatabaseUrl;
use crate::crud::{Crud, CrudOperations, SchemaBinding};
use crate::drivers::{SqliteConnection, TokioPostgresConnection};
use crate::entity_manager::EntityManager;
use crate::error::{Result, SqlRepoError};
use crate::logging::LogSettings;
use crate::mapper::DataMapper;
use crate::repository::DataRepository;
use crate::traits::DatabaseConnection;

pub type ConnectionConstructor = fn(&DatabaseUrl) -> Result<Arc<dyn DatabaseConnection>>;
pub type QueryBuilderConstructor = fn(Dialect) -> Arc<dyn QueryBuilder>;
pub type CrudConstructor =
    fn(DataMapper, Arc<dyn QueryBuilder>, SchemaBinding) -> Arc<dyn CrudOperations>;
pub type RepositoryConstructor = fn(EntityManager) -> DataRepository;

fn unknown_key<T>(kind: &str, key: &str, registry: &HashMap<String, T>) -> SqlRepoError {
    let mut known: Vec<&str> = registry.keys().map(String::as_str).collect();
    known.sort_unstable();
    SqlRepoError::Configuration(format!(
        "unknown {kind} `{key}`; registered: {}",
        known.join(", ")
    ))
}

fn sorted_keys<T>(registry: &HashMap<String, T>) -> Vec<&str> {
    let mut keys: Vec<&str> = registry.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

fn sqlite_connection(url: &DatabaseUrl) -> Result<Arc<dyn DatabaseConnection>> {
    match url {
        DatabaseUrl::Memory => Ok(Arc::new(SqliteConnection::in_memory()?)),
        DatabaseUrl::Sqlite { path } => Ok(Arc::new(SqliteConnection::file(path))),
        other => Err(SqlRepoError::Configuration(format!(
            "`{other}` is not a sqlite url"
        ))),
    }
}

fn postgres_connection(url: &DatabaseUrl) -> Result<Arc<dyn DatabaseConnection>> {
    match url {
        DatabaseUrl::Postgres { connection_string } => {
            Ok(Arc::new(TokioPostgresConnection::new(connection_string)?))
        }
        other => Err(SqlRepoError::Configuration(format!(
            "`{other}` is not a postgres url"
        ))),
    }
}

/// Storage connections by URL scheme.
pub struct DataMapperFactory {
    constructors: HashMap<String, ConnectionConstructor>,
}

impl DataMapperFactory {
    pub fn new() -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
        };
        factory
            .register("sqlite", sqlite_connection)
            .register("postgres", postgres_connection);
        factory
    }

    pub fn register(&mut self, key: impl Into<String>, constructor: ConnectionConstructor) -> &mut Self {
        self.constructors.insert(key.into(), constructor);
        self
    }

    pub fn keys(&self) -> Vec<&str> {
        sorted_keys(&self.constructors)
    }

    /// Connection for `url`, chosen by its scheme.
    pub fn create(&self, url: &DatabaseUrl) -> Result<Arc<dyn DatabaseConnection>> {
        self.create_with(url.scheme(), url)
    }

    /// Connection for `url` from the constructor registered under `key`.
    pub fn create_with(&self, key: &str, url: &DatabaseUrl) -> Result<Arc<dyn DatabaseConnection>> {
        let constructor = self
            .constructors
            .get(key)
            .ok_or_else(|| unknown_key("storage connection", key, &self.constructors))?;
        debug!(key, url = %url, "creating storage connection");
        constructor(url)
    }
}

impl Default for DataMapperFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn standard_query_builder(dialect: Dialect) -> Arc<dyn QueryBuilder> {
    Arc::new(SqlQueryBuilder::new(dialect))
}

/// Query builders by name.
pub struct QueryBuilderFactory {
    constructors: HashMap<String, QueryBuilderConstructor>,
}

impl QueryBuilderFactory {
    pub fn new() -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
        };
        factory.register("standard", standard_query_builder);
        factory
    }

    pub fn register(&mut self, key: impl Into<String>, constructor: QueryBuilderConstructor) -> &mut Self {
        self.constructors.insert(key.into(), constructor);
        self
    }

    pub fn keys(&self) -> Vec<&str> {
        sorted_keys(&self.constructors)
    }

    pub fn create(&self, key: &str, dialect: Dialect) -> Result<Arc<dyn QueryBuilder>> {
        let constructor = self
            .constructors
            .get(key)
            .ok_or_else(|| unknown_key("query builder", key, &self.constructors))?;
        Ok(constructor(dialect))
    }
}

impl Default for QueryBuilderFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn standard_crud(
    mapper: DataMapper,
    query_builder: Arc<dyn QueryBuilder>,
    schema: SchemaBinding,
) -> Arc<dyn CrudOperations> {
    Arc::new(Crud::new(mapper, query_builder, schema))
}

/// Entity managers over one storage connection and query builder.
///
/// Every manager gets its own [`DataMapper`].
pub struct EntityManagerFactory {
    connection: Arc<dyn DatabaseConnection>,
    query_builder: Arc<dyn QueryBuilder>,
    log_settings: LogSettings,
    constructors: HashMap<String, CrudConstructor>,
}

impl EntityManagerFactory {
    pub fn new(connection: Arc<dyn DatabaseConnection>, query_builder: Arc<dyn QueryBuilder>) -> Self {
        let mut factory = Self {
            connection,
            query_builder,
            log_settings: LogSettings::default(),
            constructors: HashMap::new(),
        };
        factory.register("crud", standard_crud);
        factory
    }

    pub fn with_log_settings(mut self, settings: LogSettings) -> Self {
        self.log_settings = settings;
        self
    }

    pub fn register(&mut self, key: impl Into<String>, constructor: CrudConstructor) -> &mut Self {
        self.constructors.insert(key.into(), constructor);
        self
    }

    pub fn keys(&self) -> Vec<&str> {
        sorted_keys(&self.constructors)
    }

    pub fn create(&self, key: &str, schema: SchemaBinding) -> Result<EntityManager> {
        let constructor = self
            .constructors
            .get(key)
            .ok_or_else(|| unknown_key("crud", key, &self.constructors))?;

        let mapper = DataMapper::new(Arc::clone(&self.connection))
            .with_log_settings(self.log_settings.clone());
        debug!(key, table = %schema.table, "creating entity manager");
        Ok(EntityManager::new(constructor(
            mapper,
            Arc::clone(&self.query_builder),
            schema,
        )))
    }
}

fn default_repository(manager: EntityManager) -> DataRepository {
    DataRepository::new(manager)
}

/// Repositories for one table.
pub struct DataRepositoryFactory {
    crud_key: String,
    schema: SchemaBinding,
    constructors: HashMap<String, RepositoryConstructor>,
}

impl DataRepositoryFactory {
    /// `crud_key` picks the CRUD implementation from the
    /// [`EntityManagerFactory`] passed to [`create`](Self::create).
    pub fn new(crud_key: impl Into<String>, schema: SchemaBinding) -> Self {
        let mut factory = Self {
            crud_key: crud_key.into(),
            schema,
            constructors: HashMap::new(),
        };
        factory.register("default", default_repository);
        factory
    }

    pub fn register(&mut self, key: impl Into<String>, constructor: RepositoryConstructor) -> &mut Self {
        self.constructors.insert(key.into(), constructor);
        self
    }

    pub fn keys(&self) -> Vec<&str> {
        sorted_keys(&self.constructors)
    }

    pub fn create(&self, key: &str, managers: &EntityManagerFactory) -> Result<DataRepository> {
        let constructor = self
            .constructors
            .get(key)
            .ok_or_else(|| unknown_key("repository", key, &self.constructors))?;
        let manager = managers.create(&self.crud_key, self.schema.clone())?;
        Ok(constructor(manager))
    }
}
