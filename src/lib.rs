//! sqlrepo - a small repository/data-mapper layer over SQL storage
//!
//! Descriptors of insert/select/update/delete/search/raw operations are
//! rendered into SQL with `:name` placeholders, bound with inferred storage
//! types and executed one statement per call through a pluggable
//! [`DatabaseConnection`]. SQLite (rusqlite) and PostgreSQL (tokio-postgres)
//! connections are built in.
//!
//! # Example
//! ```ignore
//! use sqlrepo::{SqlRepoClient, ValueMap};
//!
//! let client = SqlRepoClient::connect("sqlite:./data/app.db").await?;
//! let users = client.repository("users", "id")?;
//!
//! let crud = users.entity_manager().crud();
//! crud.create(
//!     ValueMap::new()
//!         .with("first_name", "Ann")
//!         .with("last_name", "Lee"),
//! )
//! .await?;
//!
//! let id = crud.last_id().await?;
//! let ann = users.find(id).await?;
//! ```

pub mod builders;
pub mod clauses;
pub mod config;
pub mod crud;
pub mod drivers;
pub mod entity_manager;
pub mod error;
pub mod factory;
pub mod logging;
pub mod mapper;
pub mod placeholders;
pub mod repository;
pub mod traits;
pub mod types;

mod client;

// Re-export main types for convenient access
pub use builders::{Dialect, QueryBuilder, QueryDescriptor, QueryOptions, SqlQueryBuilder};
pub use clauses::WhereClause;
pub use client::SqlRepoClient;
pub use config::{DatabaseUrl, SqlRepoConfig};
pub use crud::{Crud, CrudOperations, SchemaBinding};
pub use entity_manager::EntityManager;
pub use error::{NotFound, Result, SqlRepoError};
pub use logging::{init_logging, LogLevel, LogSettings};
pub use mapper::DataMapper;
pub use repository::{DataRepository, Lookup, Page, Paging};
pub use traits::{Column, DatabaseConnection, DatabaseDriver, Table};
pub use types::{BoundParameter, ParamType, QueryResult, RawQueryResult, Row, SqlValue, ValueMap};
