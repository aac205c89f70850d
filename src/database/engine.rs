//! Database Engine Abstraction Layer
//!
//! 異なるデータベースエンジンに対する統一インターフェース。
//! 接続はプールせず、処理単位ごとに開いて閉じる。

use super::types::{DatabaseError, ExecuteResult, QueryResult, Value};
use crate::dialect::Dialect;
use async_trait::async_trait;
use std::sync::Arc;

/// データベースエンジン抽象化トレイト
#[async_trait]
pub trait DatabaseEngine: Send + Sync {
    /// エンジンの方言を返す
    fn dialect(&self) -> Dialect;

    /// 接続文字列から新しい接続を開く
    async fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DatabaseConnection>, DatabaseError>;
}

/// データベース接続抽象化トレイト
///
/// 接続は `Drop` でも解放されるが、正常系では `close` で明示的に閉じる
#[async_trait]
pub trait DatabaseConnection: Send {
    /// 行を返すクエリを実行
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, DatabaseError>;

    /// INSERT/UPDATE/DELETE/DDLを実行
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecuteResult, DatabaseError>;

    /// 接続を明示的に閉じる
    async fn close(self: Box<Self>) -> Result<(), DatabaseError>;
}

/// 方言に対応するエンジンを構築
pub fn engine_for(dialect: Dialect) -> Arc<dyn DatabaseEngine> {
    match dialect {
        Dialect::SqlServer => Arc::new(super::engines::SqlServerEngine),
        Dialect::PostgreSql => Arc::new(super::engines::PostgreSqlEngine),
        Dialect::Sqlite => Arc::new(super::engines::SqliteEngine),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_for_matches_dialect() {
        for dialect in Dialect::all() {
            assert_eq!(engine_for(*dialect).dialect(), *dialect);
        }
    }
}
