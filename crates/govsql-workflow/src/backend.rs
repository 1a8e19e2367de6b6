//! Database capability interface
//!
//! The workflow never touches a connection directly; it goes through
//! [`QueryBackend`]. The DuckDB implementation opens a scoped
//! connection per call. Execution failures come back as the driver's
//! message verbatim; only catalog unavailability is a typed error,
//! because it aborts the run.

use async_trait::async_trait;
use thiserror::Error;

use govsql_duck::{DatabaseConfig, QueryResult};

/// The schema catalog could not be read; fatal for the run.
#[derive(Debug, Error)]
#[error("Schema catalog unavailable: {0}")]
pub struct SchemaUnavailable(pub String);

#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Textual catalog description of a schema.
    async fn describe_schema(&self, schema: &str) -> Result<String, SchemaUnavailable>;

    /// Run a statement; `Err` carries the driver's error message.
    async fn execute(&self, schema: &str, sql: &str) -> Result<QueryResult, String>;
}

/// DuckDB-backed implementation.
pub struct DuckBackend {
    db: DatabaseConfig,
}

impl DuckBackend {
    pub fn new(db: DatabaseConfig) -> Self {
        Self { db }
    }
}

#[async_trait]
impl QueryBackend for DuckBackend {
    async fn describe_schema(&self, schema: &str) -> Result<String, SchemaUnavailable> {
        govsql_duck::describe_schema(&self.db, schema).map_err(|e| SchemaUnavailable(e.to_string()))
    }

    async fn execute(&self, schema: &str, sql: &str) -> Result<QueryResult, String> {
        govsql_duck::execute(&self.db, schema, sql).map_err(|e| e.to_string())
    }
}
