use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BoundParameter, RawQueryResult};

/// A live handle to the database, obtained from [`DatabaseConnection::open`].
///
/// Drivers are responsible for:
/// - Preparing statement text the way the engine expects it
/// - Converting bound parameters to native types
/// - Executing statements and converting results to RawQueryResult
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Parse the statement without running it.
    /// Statement text uses named placeholders (`:name`).
    async fn prepare(&self, sql: &str) -> Result<()>;

    /// Execute a statement with the given named parameters.
    async fn execute(&self, sql: &str, params: &[BoundParameter]) -> Result<RawQueryResult>;
}

/// The storage connection collaborator.
///
/// Opening and closing physical connections, and whatever pooling or TLS
/// that involves, belongs to implementations of this trait.
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    /// Acquire a live handle.
    async fn open(&self) -> Result<Arc<dyn DatabaseDriver>>;

    /// Release the handle acquired by [`open`](Self::open).
    async fn close(&self) -> Result<()>;
}
