//! Database Driver Module
//!
//! 方言ごとのドライバを統一的な接続インターフェースで扱う

pub mod engine;
pub mod engines;
pub mod types;

pub use engine::{engine_for, DatabaseConnection, DatabaseEngine};
pub use types::{DatabaseError, ExecuteResult, QueryResult, Value};
