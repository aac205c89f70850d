//! Schema provisioning
//!
//! 論理スキーマ定義、方言ごとのDDL変換、使い捨てデータベースの作成と削除

pub mod ddl;
pub mod definition;
pub mod provisioner;

pub use ddl::DdlTranslator;
pub use definition::{
    ColumnDefinition, ColumnType, Constraint, DefaultValue, SchemaDefinition, TableDefinition,
};
pub use provisioner::{Provision, SchemaProvisioner};

use crate::database::DatabaseError;

/// プロビジョニングエラー
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("Cannot translate table {table}: {reason}")]
    Translation { table: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
