//! PostgreSQL query executor
//!
//! - Pooled connections with configurable timeouts
//! - One connection checked out per query and released on every exit path
//! - Parameters always bound positionally, never spliced into the SQL text

use super::QueryExecutor;
use crate::domain::error::{AppError, Result};
use crate::domain::query::QueryResult;
use async_trait::async_trait;
use bigdecimal::ToPrimitive;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::BigDecimal;
use sqlx::{Column, Postgres, Row, TypeInfo};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConnectionConfig {
    pub max_connections: u32,
    /// Seconds to wait for a free pooled connection.
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DbConnectionConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connect_timeout_secs: 10,
            query_timeout_secs: 30,
            idle_timeout_secs: 300,
        }
    }
}

pub struct PgQueryExecutor {
    pool: PgPool,
    config: DbConnectionConfig,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool, config: DbConnectionConfig) -> Self {
        Self { pool, config }
    }

    /// Builds the pool without opening a connection; the first query connects.
    pub fn connect_lazy(database_url: &str, config: DbConnectionConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect_lazy(database_url)
            .map_err(|e| {
                error!("Invalid database URL: {}", e);
                AppError::ConfigError(format!("Invalid database URL: {}", e))
            })?;

        info!(
            max_connections = config.max_connections,
            "Created PostgreSQL connection pool"
        );
        Ok(Self::new(pool, config))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        info!("Closing PostgreSQL connection pool");
        self.pool.close().await;
    }

    fn bind_all<'q>(
        sql: &'q str,
        params: &[serde_json::Value],
    ) -> Query<'q, Postgres, PgArguments> {
        params.iter().fold(sqlx::query(sql), |query, param| match param {
            serde_json::Value::Null => query.bind(None::<String>),
            serde_json::Value::Bool(flag) => query.bind(*flag),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(int), _) => query.bind(int),
                (None, Some(float)) => query.bind(float),
                (None, None) => query.bind(n.to_string()),
            },
            serde_json::Value::String(text) => query.bind(text.clone()),
            other => query.bind(other.to_string()),
        })
    }
}

/// Decodes one cell by its Postgres type; undecodable cells become null.
fn cell_value(row: &PgRow, index: usize) -> serde_json::Value {
    use serde_json::Value;

    let type_name = row.column(index).type_info().name().to_ascii_uppercase();
    let decoded: std::result::Result<Option<Value>, sqlx::Error> = match type_name.as_str() {
        "INT2" => row.try_get::<Option<i16>, _>(index).map(|v| v.map(Value::from)),
        "INT4" => row.try_get::<Option<i32>, _>(index).map(|v| v.map(Value::from)),
        "INT8" => row.try_get::<Option<i64>, _>(index).map(|v| v.map(Value::from)),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index).map(|v| v.map(Value::from)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map(|v| v.map(Value::from)),
        "NUMERIC" => row
            .try_get::<Option<BigDecimal>, _>(index)
            .map(|v| v.map(numeric_value)),
        "BOOL" => row.try_get::<Option<bool>, _>(index).map(|v| v.map(Value::from)),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .map(|v| v.map(|ts| Value::from(ts.to_rfc3339()))),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .map(|v| v.map(|ts| Value::from(ts.to_string()))),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .map(|v| v.map(|d| Value::from(d.to_string()))),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index),
        _ => row.try_get::<Option<String>, _>(index).map(|v| v.map(Value::from)),
    };

    decoded.ok().flatten().unwrap_or(Value::Null)
}

/// Money-like numerics go out as JSON numbers when they fit an f64.
fn numeric_value(d: BigDecimal) -> serde_json::Value {
    d.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(d.to_string()))
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn execute(&self, sql: &str, params: &[serde_json::Value]) -> Result<QueryResult> {
        let timeout = Duration::from_secs(self.config.query_timeout_secs);

        // Checked out for this query only; dropping it returns it to the pool.
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::ExecutionError(format!("Failed to acquire connection: {}", e)))?;

        let query = Self::bind_all(sql, params);
        let rows = tokio::time::timeout(timeout, query.fetch_all(&mut *conn))
            .await
            .map_err(|_| {
                AppError::ExecutionError(format!(
                    "Query timed out after {} seconds",
                    self.config.query_timeout_secs
                ))
            })?
            .map_err(|e| AppError::ExecutionError(format!("Query execution failed: {}", e)))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let records: Vec<HashMap<String, serde_json::Value>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), cell_value(row, i)))
                    .collect()
            })
            .collect();

        debug!(row_count = records.len(), "Query executed");

        Ok(QueryResult {
            columns,
            row_count: records.len(),
            rows: records,
        })
    }
}
