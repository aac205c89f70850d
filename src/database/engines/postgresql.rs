//! PostgreSQL Engine Implementation
//!
//! Single, unpooled PostgreSQL connections backed by sqlx.

use crate::database::{
    engine::{DatabaseConnection, DatabaseEngine},
    types::{DatabaseError, ExecuteResult, QueryResult, Value},
};
use crate::dialect::Dialect;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Column, Connection, Postgres, Row, TypeInfo, ValueRef};
use std::time::Instant;

/// PostgreSQL Engine
pub struct PostgreSqlEngine;

#[async_trait]
impl DatabaseEngine for PostgreSqlEngine {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
    }

    async fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DatabaseConnection>, DatabaseError> {
        let conn = sqlx::PgConnection::connect(connection_string)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        Ok(Box::new(PostgreSqlConnection { conn }))
    }
}

/// PostgreSQL Connection
pub struct PostgreSqlConnection {
    conn: sqlx::PgConnection,
}

impl PostgreSqlConnection {
    fn bind<'q>(
        mut query: sqlx::query::Query<'q, Postgres, PgArguments>,
        params: &'q [Value],
    ) -> sqlx::query::Query<'q, Postgres, PgArguments> {
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<i64>),
                Value::Bool(b) => query.bind(*b),
                Value::Int(i) => query.bind(*i),
                Value::Float(f) => query.bind(*f),
                Value::String(s) => query.bind(s.as_str()),
                Value::Binary(b) => query.bind(b.as_slice()),
                Value::DateTime(dt) => query.bind(*dt),
                Value::Uuid(u) => query.bind(*u),
            };
        }
        query
    }

    /// Extract value from PostgreSQL row based on the column type
    fn extract_value(row: &PgRow, idx: usize) -> Result<Value, DatabaseError> {
        let value_ref = row.try_get_raw(idx).map_err(|e| {
            DatabaseError::QueryFailed(format!("Failed to get value at index {}: {}", idx, e))
        })?;

        if value_ref.is_null() {
            return Ok(Value::Null);
        }

        let type_name = row.columns()[idx].type_info().name().to_string();
        let conversion = |e: sqlx::Error| {
            DatabaseError::ConversionError(format!("Failed to read {}: {}", type_name, e))
        };

        let value = match type_name.as_str() {
            "INT2" => Value::Int(row.try_get::<i16, _>(idx).map_err(conversion)? as i64),
            "INT4" => Value::Int(row.try_get::<i32, _>(idx).map_err(conversion)? as i64),
            "INT8" => Value::Int(row.try_get::<i64, _>(idx).map_err(conversion)?),
            "BOOL" => Value::Bool(row.try_get::<bool, _>(idx).map_err(conversion)?),
            "FLOAT4" => Value::Float(row.try_get::<f32, _>(idx).map_err(conversion)? as f64),
            "FLOAT8" => Value::Float(row.try_get::<f64, _>(idx).map_err(conversion)?),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                Value::String(row.try_get::<String, _>(idx).map_err(conversion)?)
            }
            "UUID" => Value::Uuid(row.try_get::<uuid::Uuid, _>(idx).map_err(conversion)?),
            "BYTEA" => Value::Binary(row.try_get::<Vec<u8>, _>(idx).map_err(conversion)?),
            "TIMESTAMPTZ" => {
                Value::DateTime(row.try_get::<DateTime<Utc>, _>(idx).map_err(conversion)?)
            }
            "TIMESTAMP" => {
                let naive = row.try_get::<NaiveDateTime, _>(idx).map_err(conversion)?;
                Value::DateTime(naive.and_utc())
            }
            "DATE" => {
                let date = row.try_get::<NaiveDate, _>(idx).map_err(conversion)?;
                Value::DateTime(date.and_time(NaiveTime::default()).and_utc())
            }
            "VOID" => Value::Null,
            other => {
                return Err(DatabaseError::ConversionError(format!(
                    "Unsupported PostgreSQL type: {}",
                    other
                )))
            }
        };

        Ok(value)
    }
}

#[async_trait]
impl DatabaseConnection for PostgreSqlConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, DatabaseError> {
        let start = Instant::now();
        tracing::debug!(sql, "postgresql query");

        let rows = Self::bind(sqlx::query(sql), params)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

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

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecuteResult, DatabaseError> {
        let start = Instant::now();
        tracing::debug!(sql, "postgresql execute");

        // 引数なしの文は単純クエリプロトコルで送る（CREATE/DROP DATABASE のため）
        let result = if params.is_empty() {
            sqlx::Executor::execute(&mut self.conn, sql).await
        } else {
            Self::bind(sqlx::query(sql), params)
                .execute(&mut self.conn)
                .await
        }
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
