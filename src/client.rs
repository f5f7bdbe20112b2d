use std::sync::Arc;

use tracing::info;

use crate::builders::{Dialect, QueryBuilder};
use crate::config::SqlRepoConfig;
use crate::crud::{CrudOperations, SchemaBinding};
use crate::error::Result;
use crate::factory::{
    DataMapperFactory, DataRepositoryFactory, EntityManagerFactory, QueryBuilderFactory,
};
use crate::repository::DataRepository;
use crate::traits::{DatabaseConnection, Table};

/// Main entry point for sqlrepo.
/// Holds a storage connection and hands out repositories over it.
pub struct SqlRepoClient {
    config: SqlRepoConfig,
    connection: Arc<dyn DatabaseConnection>,
    managers: EntityManagerFactory,
}

impl SqlRepoClient {
    /// Connect to the database at `url` with default settings.
    ///
    /// # Example
    /// ```ignore
    /// let client = SqlRepoClient::connect("sqlite:./data/app.db").await?;
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(SqlRepoConfig::new(url.parse()?)).await
    }

    /// Connect using a full configuration, checking that storage is reachable.
    pub async fn connect_with(config: SqlRepoConfig) -> Result<Self> {
        let client = Self::from_config(config)?;
        client.connection.open().await?;
        client.connection.close().await?;
        info!(url = %client.config.database_url, "sqlrepo client connected");
        Ok(client)
    }

    /// Assemble the pipeline from configuration without touching storage.
    pub fn from_config(config: SqlRepoConfig) -> Result<Self> {
        let connection = DataMapperFactory::new().create(&config.database_url)?;
        let query_builder =
            QueryBuilderFactory::new().create(&config.query_builder, config.effective_dialect())?;
        Ok(Self::assemble(config, connection, query_builder))
    }

    /// Create a new client over a custom storage connection.
    /// Useful for testing or using alternative database drivers.
    pub fn with_connection(connection: Arc<dyn DatabaseConnection>, dialect: Dialect) -> Result<Self> {
        let config = SqlRepoConfig {
            dialect: Some(dialect),
            ..SqlRepoConfig::default()
        };
        let query_builder = QueryBuilderFactory::new().create(&config.query_builder, dialect)?;
        Ok(Self::assemble(config, connection, query_builder))
    }

    fn assemble(
        config: SqlRepoConfig,
        connection: Arc<dyn DatabaseConnection>,
        query_builder: Arc<dyn QueryBuilder>,
    ) -> Self {
        let managers = EntityManagerFactory::new(Arc::clone(&connection), query_builder)
            .with_log_settings(config.logging.clone());
        Self {
            config,
            connection,
            managers,
        }
    }

    pub fn config(&self) -> &SqlRepoConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<dyn DatabaseConnection> {
        &self.connection
    }

    /// Registry of CRUD implementations; register custom ones here.
    pub fn entity_managers(&mut self) -> &mut EntityManagerFactory {
        &mut self.managers
    }

    /// A repository over `table`, keyed on `primary_key`.
    pub fn repository(
        &self,
        table: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> Result<DataRepository> {
        self.repository_for_schema(SchemaBinding::new(table, primary_key))
    }

    /// A repository over the table `T` describes.
    pub fn repository_of<T: Table>(&self) -> Result<DataRepository> {
        self.repository_for_schema(SchemaBinding::of::<T>())
    }

    fn repository_for_schema(&self, schema: SchemaBinding) -> Result<DataRepository> {
        DataRepositoryFactory::new(self.config.crud.as_str(), schema)
            .create(&self.config.repository, &self.managers)
    }

    /// Direct CRUD access to `table`.
    pub fn crud(
        &self,
        table: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> Result<Arc<dyn CrudOperations>> {
        let manager = self
            .managers
            .create(&self.config.crud, SchemaBinding::new(table, primary_key))?;
        Ok(Arc::clone(manager.crud()))
    }
}
