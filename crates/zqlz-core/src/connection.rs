//! Connection and transaction traits

use crate::{QueryResult, Result, SchemaIntrospection, StatementResult, Value};
use async_trait::async_trait;

/// A live database connection.
///
/// Connections start in auto-commit mode. Manual-commit work goes through
/// [`Connection::begin_transaction`], which hands back a [`Transaction`] that
/// must be committed or rolled back explicitly.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Driver name (e.g., "sqlite", "postgres")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data or schema
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a statement that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Start a manual-commit unit of work on this connection
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Schema introspection, for drivers that support it
    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        None
    }
}

/// A database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Run a query inside the transaction
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Run a statement inside the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;
}
