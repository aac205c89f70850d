//! SQLite Engine Implementation
//!
//! Provides a single SQLite connection with sqlx integration

use crate::database::{
    engine::{DatabaseConnection, DatabaseEngine},
    types::{DatabaseError, ExecuteResult, QueryResult, Value},
};
use crate::dialect::Dialect;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row, Sqlite, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Instant;

/// SQLite Engine
pub struct SqliteEngine;

#[async_trait]
impl DatabaseEngine for SqliteEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DatabaseConnection>, DatabaseError> {
        let options = SqliteConnectOptions::from_str(connection_string)
            .map_err(|e| DatabaseError::ConfigurationError(e.to_string()))?
            .create_if_missing(true);

        let conn = options
            .connect()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        Ok(Box::new(SqliteConnection { conn }))
    }
}

/// SQLite Connection
pub struct SqliteConnection {
    conn: sqlx::SqliteConnection,
}

impl SqliteConnection {
    fn bind<'q>(
        mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
        params: &'q [Value],
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<i64>),
                Value::Bool(b) => query.bind(*b as i64),
                Value::Int(i) => query.bind(*i),
                Value::Float(f) => query.bind(*f),
                Value::String(s) => query.bind(s.as_str()),
                Value::Binary(b) => query.bind(b.as_slice()),
                Value::DateTime(dt) => query.bind(dt.to_rfc3339()),
                // Stored as TEXT so the column reads back the same under every engine
                Value::Uuid(u) => query.bind(u.to_string()),
            };
        }
        query
    }

    /// Extract value from SQLite row
    ///
    /// SQLite uses dynamic typing, so the storage class of the value itself
    /// decides the conversion rather than the declared column type.
    fn extract_value(row: &SqliteRow, idx: usize) -> Result<Value, DatabaseError> {
        let value_ref = row.try_get_raw(idx).map_err(|e| {
            DatabaseError::QueryFailed(format!("Failed to get value at index {}: {}", idx, e))
        })?;

        if value_ref.is_null() {
            return Ok(Value::Null);
        }

        let storage = value_ref.type_info().name().to_string();
        let conversion = |e: sqlx::Error| {
            DatabaseError::ConversionError(format!("Failed to read {} column: {}", storage, e))
        };

        match storage.as_str() {
            "INTEGER" => Ok(Value::Int(
                row.try_get_unchecked::<i64, _>(idx).map_err(conversion)?,
            )),
            "REAL" => Ok(Value::Float(
                row.try_get_unchecked::<f64, _>(idx).map_err(conversion)?,
            )),
            "BLOB" => Ok(Value::Binary(
                row.try_get_unchecked::<Vec<u8>, _>(idx).map_err(conversion)?,
            )),
            _ => Ok(Value::String(
                row.try_get_unchecked::<String, _>(idx).map_err(conversion)?,
            )),
        }
    }

    fn rows_to_query_result(rows: Vec<SqliteRow>, start: Instant) -> Result<QueryResult, DatabaseError> {
        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut result_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(row.len());
            for idx in 0..row.len() {
                values.push(Self::extract_value(row, idx)?);
            }
            result_rows.push(values);
        }

        Ok(QueryResult {
            columns,
            rows: result_rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, DatabaseError> {
        let start = Instant::now();
        tracing::debug!(sql, "sqlite query");

        let rows = Self::bind(sqlx::query(sql), params)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Self::rows_to_query_result(rows, start)
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecuteResult, DatabaseError> {
        let start = Instant::now();
        tracing::debug!(sql, "sqlite execute");

        let result = Self::bind(sqlx::query(sql), params)
            .execute(&mut self.conn)
            .await
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn close(self: Box<Self>) -> Result<(), DatabaseError> {
        let Self { conn } = *self;
        conn.close()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))
    }
}
