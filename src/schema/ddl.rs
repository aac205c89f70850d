//! DDL translators
//!
//! 論理スキーマを方言ごとのDDLへ変換する。エンジンを追加する場合は
//! `DdlTranslator` の実装を一つ追加する。

use super::definition::{ColumnDefinition, ColumnType, Constraint, DefaultValue, TableDefinition};
use super::ProvisioningError;
use crate::dialect::{Dialect, DialectProfile};

/// DDL変換トレイト
pub trait DdlTranslator: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// テストデータベースを作成する文（ファイルベースのエンジンでは `None`）
    fn create_database(&self, name: &str) -> Option<String>;

    /// 他セッションを切断してからテストデータベースを削除する文。
    /// 存在しない場合もエラーにならないこと
    fn drop_database(&self, name: &str) -> Vec<String>;

    /// 既定以外のスキーマを作成する文。名前空間非対応なら `None`
    fn create_namespace(&self, schema: &str) -> Option<String>;

    /// カラム型（NULL制約・既定値を含まない）
    fn column_type(&self, table: &TableDefinition, column: &ColumnDefinition)
        -> Result<String, ProvisioningError>;

    /// 自動採番列の定義全体（主キー指定を含む）
    fn identity_column(&self, table: &TableDefinition, column: &ColumnDefinition)
        -> Result<String, ProvisioningError>;

    /// 採番開始値を設定する後続の文（必要な場合のみ）
    fn seed_statement(&self, table: &TableDefinition, column: &ColumnDefinition) -> Option<String>;

    fn default_clause(&self, default: DefaultValue) -> &'static str;

    fn primary_key(&self, name: Option<&str>, columns: &[&str]) -> String;

    /// テーブル作成に必要な文を順に返す
    fn create_table(&self, table: &TableDefinition) -> Result<Vec<String>, ProvisioningError> {
        validate(table)?;
        let profile = self.dialect().profile();

        let mut parts = Vec::with_capacity(table.columns.len() + table.constraints.len());
        for column in &table.columns {
            let sql = if column.identity.is_some() {
                self.identity_column(table, column)?
            } else {
                let mut sql = format!(
                    "{} {}",
                    profile.quote(column.name),
                    self.column_type(table, column)?
                );
                if let Some(default) = column.default {
                    sql.push(' ');
                    sql.push_str(self.default_clause(default));
                }
                sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
                sql
            };
            parts.push(sql);
        }

        for constraint in &table.constraints {
            match constraint {
                Constraint::PrimaryKey { name, columns } => {
                    parts.push(self.primary_key(*name, columns));
                }
            }
        }

        let mut statements = vec![format!(
            "CREATE TABLE {} ({})",
            profile.qualified(table.schema, table.name),
            parts.join(", ")
        )];

        if let Some(seed) = table
            .identity_column()
            .and_then(|column| self.seed_statement(table, column))
        {
            statements.push(seed);
        }

        Ok(statements)
    }
}

fn translation_error(table: &TableDefinition, reason: impl Into<String>) -> ProvisioningError {
    ProvisioningError::Translation {
        table: table.display_name(),
        reason: reason.into(),
    }
}

/// 方言共通の整合性チェック
fn validate(table: &TableDefinition) -> Result<(), ProvisioningError> {
    if table.columns.is_empty() {
        return Err(translation_error(table, "table has no columns"));
    }

    let identities: Vec<_> = table.columns.iter().filter(|c| c.identity.is_some()).collect();
    if identities.len() > 1 {
        return Err(translation_error(table, "more than one identity column"));
    }
    if let Some(identity) = identities.first() {
        if !identity.ty.is_integer() {
            return Err(translation_error(
                table,
                format!("identity column {} must be an integer type", identity.name),
            ));
        }
        if identity.nullable {
            return Err(translation_error(
                table,
                format!("identity column {} cannot be nullable", identity.name),
            ));
        }
    }

    for constraint in &table.constraints {
        let Constraint::PrimaryKey { columns, .. } = constraint;
        if !identities.is_empty() {
            return Err(translation_error(
                table,
                "identity columns are already the primary key",
            ));
        }
        if columns.is_empty() {
            return Err(translation_error(table, "primary key without columns"));
        }
        if let Some(unknown) = columns
            .iter()
            .find(|name| !table.columns.iter().any(|c| c.name == **name))
        {
            return Err(translation_error(
                table,
                format!("constraint references unknown column {}", unknown),
            ));
        }
    }

    Ok(())
}

fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn quoted_list(profile: &DialectProfile, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| profile.quote(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// SQL Server: `IDENTITY(seed,1)`, `nvarchar`, `getdate()`
pub struct SqlServerDdl;

impl DdlTranslator for SqlServerDdl {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    fn create_database(&self, name: &str) -> Option<String> {
        Some(format!("CREATE DATABASE {}", self.dialect().profile().quote(name)))
    }

    fn drop_database(&self, name: &str) -> Vec<String> {
        let quoted = self.dialect().profile().quote(name);
        // 排他アクセスが必要なため、DROP前にシングルユーザーへ切り替える
        vec![format!(
            "IF DB_ID(N{}) IS NOT NULL BEGIN \
             ALTER DATABASE {} SET SINGLE_USER WITH ROLLBACK IMMEDIATE; \
             DROP DATABASE {}; END",
            string_literal(name),
            quoted,
            quoted
        )]
    }

    fn create_namespace(&self, schema: &str) -> Option<String> {
        Some(format!("CREATE SCHEMA {}", self.dialect().profile().quote(schema)))
    }

    fn column_type(
        &self,
        _table: &TableDefinition,
        column: &ColumnDefinition,
    ) -> Result<String, ProvisioningError> {
        Ok(match column.ty {
            ColumnType::Int => "int".to_string(),
            ColumnType::BigInt => "bigint".to_string(),
            ColumnType::Text(Some(len)) => format!("nvarchar({})", len),
            ColumnType::Text(None) => "nvarchar(max)".to_string(),
            ColumnType::DateTime => "datetime".to_string(),
            ColumnType::Guid => "uniqueidentifier".to_string(),
        })
    }

    fn identity_column(
        &self,
        table: &TableDefinition,
        column: &ColumnDefinition,
    ) -> Result<String, ProvisioningError> {
        let seed = column.identity.map(|i| i.seed).unwrap_or(1);
        Ok(format!(
            "{} {} IDENTITY({},1) NOT NULL PRIMARY KEY",
            self.dialect().profile().quote(column.name),
            self.column_type(table, column)?,
            seed
        ))
    }

    fn seed_statement(&self, _table: &TableDefinition, _column: &ColumnDefinition) -> Option<String> {
        None
    }

    fn default_clause(&self, default: DefaultValue) -> &'static str {
        match default {
            DefaultValue::CurrentTimestamp => "DEFAULT (getdate())",
        }
    }

    fn primary_key(&self, name: Option<&str>, columns: &[&str]) -> String {
        let profile = self.dialect().profile();
        let columns = columns
            .iter()
            .map(|c| format!("{} ASC", profile.quote(c)))
            .collect::<Vec<_>>()
            .join(", ");
        match name {
            Some(name) => format!(
                "CONSTRAINT {} PRIMARY KEY CLUSTERED ({})",
                profile.quote(name),
                columns
            ),
            None => format!("PRIMARY KEY CLUSTERED ({})", columns),
        }
    }
}

/// PostgreSQL: `SERIAL`/`BIGSERIAL` と `setval` による採番開始値
pub struct PostgresDdl;

impl DdlTranslator for PostgresDdl {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
    }

    fn create_database(&self, name: &str) -> Option<String> {
        Some(format!(
            "CREATE DATABASE {} WITH TEMPLATE = template0 ENCODING = 'UTF8' CONNECTION LIMIT = -1",
            self.dialect().profile().quote(name)
        ))
    }

    fn drop_database(&self, name: &str) -> Vec<String> {
        vec![
            format!(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                 WHERE datname = {} AND pid <> pg_backend_pid()",
                string_literal(name)
            ),
            format!(
                "DROP DATABASE IF EXISTS {}",
                self.dialect().profile().quote(name)
            ),
        ]
    }

    fn create_namespace(&self, schema: &str) -> Option<String> {
        Some(format!("CREATE SCHEMA {}", self.dialect().profile().quote(schema)))
    }

    fn column_type(
        &self,
        _table: &TableDefinition,
        column: &ColumnDefinition,
    ) -> Result<String, ProvisioningError> {
        Ok(match column.ty {
            ColumnType::Int => "integer".to_string(),
            ColumnType::BigInt => "bigint".to_string(),
            ColumnType::Text(Some(len)) => format!("varchar({})", len),
            ColumnType::Text(None) => "text".to_string(),
            ColumnType::DateTime => "timestamp".to_string(),
            ColumnType::Guid => "uuid".to_string(),
        })
    }

    fn identity_column(
        &self,
        table: &TableDefinition,
        column: &ColumnDefinition,
    ) -> Result<String, ProvisioningError> {
        let serial = match column.ty {
            ColumnType::Int => "SERIAL",
            ColumnType::BigInt => "BIGSERIAL",
            _ => return Err(translation_error(table, "SERIAL requires an integer column")),
        };
        Ok(format!(
            "{} {} PRIMARY KEY",
            self.dialect().profile().quote(column.name),
            serial
        ))
    }

    fn seed_statement(&self, table: &TableDefinition, column: &ColumnDefinition) -> Option<String> {
        let seed = column.identity?.seed;
        if seed == 1 {
            return None;
        }
        let profile = self.dialect().profile();
        // 第1引数は識別子として解釈されるためクォート込みで渡す。第2引数はそのまま
        Some(format!(
            "SELECT setval(pg_get_serial_sequence({}, {}), {}, false)",
            string_literal(&profile.qualified(table.schema, table.name)),
            string_literal(column.name),
            seed
        ))
    }

    fn default_clause(&self, default: DefaultValue) -> &'static str {
        match default {
            DefaultValue::CurrentTimestamp => "DEFAULT CURRENT_TIMESTAMP",
        }
    }

    fn primary_key(&self, name: Option<&str>, columns: &[&str]) -> String {
        let profile = self.dialect().profile();
        match name {
            Some(name) => format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                profile.quote(name),
                quoted_list(profile, columns)
            ),
            None => format!("PRIMARY KEY ({})", quoted_list(profile, columns)),
        }
    }
}

/// SQLite: `INTEGER PRIMARY KEY AUTOINCREMENT` と `sqlite_sequence` による採番開始値
///
/// スキーマ修飾は落としてメインデータベースに作成する。
pub struct SqliteDdl;

impl DdlTranslator for SqliteDdl {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn create_database(&self, _name: &str) -> Option<String> {
        None
    }

    fn drop_database(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }

    fn create_namespace(&self, _schema: &str) -> Option<String> {
        None
    }

    fn column_type(
        &self,
        _table: &TableDefinition,
        column: &ColumnDefinition,
    ) -> Result<String, ProvisioningError> {
        Ok(match column.ty {
            ColumnType::Int => "int".to_string(),
            ColumnType::BigInt => "bigint".to_string(),
            ColumnType::Text(Some(len)) => format!("nvarchar({})", len),
            ColumnType::Text(None) => "text".to_string(),
            ColumnType::DateTime => "datetime".to_string(),
            // TEXT親和性で保存する
            ColumnType::Guid => "varchar(36)".to_string(),
        })
    }

    fn identity_column(
        &self,
        table: &TableDefinition,
        column: &ColumnDefinition,
    ) -> Result<String, ProvisioningError> {
        if !column.ty.is_integer() {
            return Err(translation_error(table, "AUTOINCREMENT requires an integer column"));
        }
        // rowidの別名になるのは型名がちょうど INTEGER の場合のみ
        Ok(format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            self.dialect().profile().quote(column.name)
        ))
    }

    fn seed_statement(&self, table: &TableDefinition, column: &ColumnDefinition) -> Option<String> {
        let seed = column.identity?.seed;
        if seed == 1 {
            return None;
        }
        // sqlite_sequence は最後に払い出した値を保持する
        Some(format!(
            "INSERT INTO sqlite_sequence (name, seq) VALUES ({}, {})",
            string_literal(table.name),
            seed - 1
        ))
    }

    fn default_clause(&self, default: DefaultValue) -> &'static str {
        match default {
            DefaultValue::CurrentTimestamp => "DEFAULT CURRENT_TIMESTAMP",
        }
    }

    fn primary_key(&self, name: Option<&str>, columns: &[&str]) -> String {
        let profile = self.dialect().profile();
        match name {
            Some(name) => format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                profile.quote(name),
                quoted_list(profile, columns)
            ),
            None => format!("PRIMARY KEY ({})", quoted_list(profile, columns)),
        }
    }
}
