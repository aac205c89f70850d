//! Database Types and Common Structures
//!
//! ドライバ層で使用される共通の型定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// データベース値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
    DateTime(DateTime<Utc>),
    Uuid(uuid::Uuid),
}

impl Value {
    pub fn from_string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn from_i32(i: i32) -> Self {
        Value::Int(i as i64)
    }

    pub fn from_i64(i: i64) -> Self {
        Value::Int(i)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// GUID列はエンジンによって文字列で返るため、両方を受け付ける
    pub fn as_uuid(&self) -> Option<uuid::Uuid> {
        match self {
            Value::Uuid(u) => Some(*u),
            Value::String(s) => uuid::Uuid::parse_str(s).ok(),
            Value::Binary(b) => uuid::Uuid::from_slice(b).ok(),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(u: uuid::Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// クエリ結果
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// カラム名
    pub columns: Vec<String>,
    /// 行データ
    pub rows: Vec<Vec<Value>>,
    /// 実行時間（ミリ秒）
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// 先頭行の先頭カラム
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// コマンド実行結果
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    /// 影響を受けた行数
    pub rows_affected: u64,
    /// 実行時間（ミリ秒）
    pub execution_time_ms: u64,
}

/// データベースエラー
#[derive(Debug, Clone, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Data conversion error: {0}")]
    ConversionError(String),
}

impl DatabaseError {
    /// "does not exist" 系のエラーかどうか（冪等なDROPで無視する）
    pub fn is_missing_object(&self) -> bool {
        let message = match self {
            DatabaseError::QueryFailed(m) | DatabaseError::ConnectionFailed(m) => m,
            _ => return false,
        };
        let lower = message.to_ascii_lowercase();
        lower.contains("does not exist")
            || lower.contains("cannot drop the database")
            || lower.contains("no such")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_into_value() {
        let none: Option<i32> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some(7)), Value::Int(7));
    }

    #[test]
    fn test_as_uuid_accepts_text() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(Value::String(id.to_string()).as_uuid(), Some(id));
        assert_eq!(Value::Uuid(id).as_uuid(), Some(id));
        assert_eq!(Value::Int(1).as_uuid(), None);
    }

    #[test]
    fn test_missing_object_detection() {
        let pg = DatabaseError::QueryFailed(
            "error returned from database: database \"x\" does not exist".to_string(),
        );
        assert!(pg.is_missing_object());

        let mssql = DatabaseError::QueryFailed(
            "Cannot drop the database 'x', because it does not exist".to_string(),
        );
        assert!(mssql.is_missing_object());

        let other = DatabaseError::QueryFailed("permission denied".to_string());
        assert!(!other.is_missing_object());
    }
}
