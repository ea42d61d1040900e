//! Warehouse client trait definition

use crate::error::DbResult;
use async_trait::async_trait;

/// One row of a query result, every column rendered as text (`None` = NULL)
pub type Row = Vec<Option<String>>;

/// Capability surface the migration engine needs from a warehouse.
///
/// There is no transaction or savepoint support: each call auto-commits.
/// Implementations must be Send + Sync for async operation.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute a single statement, returns affected rows
    async fn execute(&self, sql: &str) -> DbResult<usize>;

    /// Execute a script of one or more `;`-separated statements
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Run a query and return all rows in result order
    async fn query_rows(&self, sql: &str) -> DbResult<Vec<Row>>;

    /// Check if a table or view exists (name may be schema-qualified)
    async fn relation_exists(&self, name: &str) -> DbResult<bool>;

    /// Create a schema if it does not exist
    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()>;

    /// Warehouse type identifier for logging
    fn db_type(&self) -> &'static str;
}
