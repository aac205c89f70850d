//! # crud-harness
//!
//! 同じCRUDテストスイートを SQL Server / PostgreSQL / SQLite に対して実行する統合テストハーネス。
//!
//! 方言ごとに使い捨てのデータベースを作成し、標準スキーマを構築してから、
//! 登録済みのテストを順番に実行する。最初の失敗で打ち切り、最後に必ずデータベースを削除する。

pub mod config;
pub mod crud;
pub mod database;
pub mod dialect;
pub mod error;
pub mod harness;
pub mod logging;
pub mod schema;
pub mod suite;

pub use dialect::{profile_for, Dialect, DialectProfile};
pub use error::{Error, Result};
pub use harness::{Harness, HarnessOutcome, HarnessState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::InvalidState("test".to_string());
        assert!(err.to_string().contains("test"));
    }
}
