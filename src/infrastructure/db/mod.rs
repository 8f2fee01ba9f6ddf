pub mod executor;

use crate::domain::error::Result;
use crate::domain::query::QueryResult;
use async_trait::async_trait;

pub use executor::{DbConnectionConfig, PgQueryExecutor};

/// Runs an already-validated statement with positional parameters.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str, params: &[serde_json::Value]) -> Result<QueryResult>;
}
