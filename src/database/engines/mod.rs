//! Database Engines Module
//!
//! 各種データベースエンジンの実装を提供

pub mod postgresql;
pub mod sqlite;
pub mod sqlserver;

pub use postgresql::PostgreSqlEngine;
pub use sqlite::SqliteEngine;
pub use sqlserver::SqlServerEngine;
