//! SQL Server Engine Implementation
//!
//! tiberius クライアントを tokio の TcpStream 上で動かす。
//! 接続文字列は ADO.NET 形式（`server=tcp:host,port;...`）。

use crate::database::{
    engine::{DatabaseConnection, DatabaseEngine},
    types::{DatabaseError, ExecuteResult, QueryResult, Value},
};
use crate::dialect::Dialect;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::time::Instant;
use tiberius::{Client, ColumnData, Config, FromSql, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

/// SQL Serverエンジン
pub struct SqlServerEngine;

#[async_trait]
impl DatabaseEngine for SqlServerEngine {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    async fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DatabaseConnection>, DatabaseError> {
        let config = Config::from_ado_string(connection_string)
            .map_err(|e| DatabaseError::ConfigurationError(e.to_string()))?;

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        Ok(Box::new(SqlServerConnection { client }))
    }
}

/// SQL Server接続
pub struct SqlServerConnection {
    client: Client<Compat<TcpStream>>,
}

impl SqlServerConnection {
    /// パラメータは `@P1`, `@P2`, ... に順番にバインドされる
    fn build_query<'a>(sql: &'a str, params: &'a [Value]) -> Query<'a> {
        let mut query = Query::new(sql);
        for param in params {
            match param {
                Value::Null => query.bind(Option::<i64>::None),
                Value::Bool(b) => query.bind(*b),
                Value::Int(i) => query.bind(*i),
                Value::Float(f) => query.bind(*f),
                Value::String(s) => query.bind(s.as_str()),
                Value::Binary(b) => query.bind(b.as_slice()),
                Value::DateTime(dt) => query.bind(dt.naive_utc()),
                // nvarchar -> uniqueidentifier は暗黙変換される
                Value::Uuid(u) => query.bind(u.to_string()),
            }
        }
        query
    }

    fn convert_cell(data: &ColumnData<'static>) -> Result<Value, DatabaseError> {
        let value = match data {
            ColumnData::U8(v) => v.map(|n| Value::Int(n as i64)),
            ColumnData::I16(v) => v.map(|n| Value::Int(n as i64)),
            ColumnData::I32(v) => v.map(|n| Value::Int(n as i64)),
            ColumnData::I64(v) => v.map(Value::Int),
            ColumnData::F32(v) => v.map(|n| Value::Float(n as f64)),
            ColumnData::F64(v) => v.map(Value::Float),
            ColumnData::Bit(v) => v.map(Value::Bool),
            ColumnData::String(v) => v.as_ref().map(|s| Value::String(s.to_string())),
            ColumnData::Guid(v) => v.map(|g| Value::String(g.to_string())),
            ColumnData::Binary(v) => v.as_ref().map(|b| Value::Binary(b.to_vec())),
            ColumnData::DateTime(_)
            | ColumnData::SmallDateTime(_)
            | ColumnData::DateTime2(_) => NaiveDateTime::from_sql(data)
                .map_err(|e| DatabaseError::ConversionError(e.to_string()))?
                .map(|dt| Value::DateTime(dt.and_utc())),
            other => {
                return Err(DatabaseError::ConversionError(format!(
                    "Unsupported SQL Server column data: {:?}",
                    other
                )))
            }
        };

        Ok(value.unwrap_or(Value::Null))
    }

    fn rows_to_query_result(rows: Vec<Row>, start: Instant) -> Result<QueryResult, DatabaseError> {
        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut result_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::new();
            for (_, data) in row.cells() {
                values.push(Self::convert_cell(data)?);
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
impl DatabaseConnection for SqlServerConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, DatabaseError> {
        let start = Instant::now();
        tracing::debug!(sql, "sqlserver query");

        let stream = Self::build_query(sql, params)
            .query(&mut self.client)
            .await
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        // バッチ内のSELECTが複数あっても、行を返した最後の結果セットを採用する
        let rows = stream
            .into_results()
            .await
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
            .into_iter()
            .filter(|set| !set.is_empty())
            .last()
            .unwrap_or_default();

        Self::rows_to_query_result(rows, start)
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecuteResult, DatabaseError> {
        let start = Instant::now();
        tracing::debug!(sql, "sqlserver execute");

        let result = if params.is_empty() {
            // CREATE DATABASE 等はRPCではなく素のバッチで送る
            self.client
                .simple_query(sql)
                .await
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
                .into_results()
                .await
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            0
        } else {
            Self::build_query(sql, params)
                .execute(&mut self.client)
                .await
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
                .total()
        };

        Ok(ExecuteResult {
            rows_affected: result,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn close(self: Box<Self>) -> Result<(), DatabaseError> {
        let Self { client } = *self;
        client
            .close()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_null_and_ints() {
        assert_eq!(
            SqlServerConnection::convert_cell(&ColumnData::I32(None)).unwrap(),
            Value::Null
        );
        assert_eq!(
            SqlServerConnection::convert_cell(&ColumnData::I64(Some(2_147_483_650))).unwrap(),
            Value::Int(2_147_483_650)
        );
    }

    #[test]
    fn test_convert_guid_as_text() {
        let id = uuid::Uuid::new_v4();
        let value = SqlServerConnection::convert_cell(&ColumnData::Guid(Some(id))).unwrap();
        assert_eq!(value.as_uuid(), Some(id));
    }
}
