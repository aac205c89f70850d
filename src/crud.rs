//! CRUD contract
//!
//! テストスイートが使う最小限のCRUD操作。方言ごとのSQLを組み立てて
//! 呼び出し側が渡した接続で実行する（ORMではない）。

use crate::database::{DatabaseConnection, DatabaseError, Value};
use crate::dialect::{Dialect, DialectProfile, KeyRetrieval, PagingSyntax};
use crate::error::{Error, Result};
use std::sync::RwLock;
use tracing::debug;

static CURRENT_DIALECT: RwLock<Option<Dialect>> = RwLock::new(None);

/// プロセス全体の方言を設定する（1回の実行につき、テスト開始前に1度だけ）
pub fn set_dialect(dialect: Dialect) {
    let mut current = CURRENT_DIALECT
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    debug!("Dialect context set to {}", dialect);
    *current = Some(dialect);
}

pub fn current_dialect() -> Option<Dialect> {
    *CURRENT_DIALECT
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// CRUD操作のエラー
#[derive(Debug, thiserror::Error)]
pub enum CrudError {
    #[error("{0} has no key column")]
    MissingKey(String),

    #[error("Unknown column {column} on {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Nothing to update on {0}")]
    NothingToUpdate(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub type CrudResult<T> = std::result::Result<T, CrudError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// データベースが採番する
    Identity,
    /// 呼び出し側が値を渡す（GUIDなど）
    Supplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    pub column: &'static str,
    pub kind: KeyKind,
}

/// テーブルの静的な記述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entity {
    pub table: &'static str,
    pub schema: Option<&'static str>,
    pub key: Option<Key>,
    /// INSERT/UPDATE対象のカラム（キーを除く）
    pub columns: &'static [&'static str],
    /// 既定値で埋まる読み取り専用カラム
    pub readonly: &'static [&'static str],
}

impl Entity {
    /// SELECTで返すカラム（キー → 書き込み可能 → 読み取り専用）
    pub fn selectable(&self) -> Vec<&'static str> {
        self.key
            .iter()
            .map(|k| k.column)
            .chain(self.columns.iter().copied())
            .chain(self.readonly.iter().copied())
            .collect()
    }

    fn key(&self) -> CrudResult<&Key> {
        self.key
            .as_ref()
            .ok_or_else(|| CrudError::MissingKey(self.display_name()))
    }

    fn display_name(&self) -> String {
        match self.schema {
            Some(schema) => format!("{}.{}", schema, self.table),
            None => self.table.to_string(),
        }
    }

    fn has_column(&self, column: &str) -> bool {
        self.selectable().iter().any(|c| *c == column)
    }
}

/// 1行分の値（カラム名の大文字小文字は区別しない）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        let value = value.into();
        match self
            .fields
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
        {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn from_row(columns: &[String], row: Vec<Value>) -> Self {
        Self {
            fields: columns.iter().cloned().zip(row).collect(),
        }
    }
}

/// 方言を明示的に持つCRUD実行器
#[derive(Debug, Clone, Copy)]
pub struct Crud {
    profile: &'static DialectProfile,
}

impl Crud {
    pub fn new(profile: &'static DialectProfile) -> Self {
        Self { profile }
    }

    /// グローバルな方言コンテキストから作成
    pub fn from_context() -> Result<Self> {
        current_dialect()
            .map(|dialect| Self::new(dialect.profile()))
            .ok_or_else(|| Error::InvalidState("dialect context has not been set".to_string()))
    }

    pub fn profile(&self) -> &'static DialectProfile {
        self.profile
    }

    fn table_name(&self, entity: &Entity) -> String {
        self.profile.qualified(entity.schema, entity.table)
    }

    fn select_list(&self, entity: &Entity) -> String {
        entity
            .selectable()
            .iter()
            .map(|c| self.profile.quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// INSERT文とバインド値を組み立てる
    pub fn insert_sql(&self, entity: &Entity, values: &Record) -> (String, Vec<Value>) {
        let mut columns: Vec<&str> = Vec::new();
        if let Some(key) = entity.key.filter(|k| k.kind == KeyKind::Supplied) {
            columns.push(key.column);
        }
        columns.extend(entity.columns.iter().copied());

        let params: Vec<Value> = columns
            .iter()
            .map(|c| values.get(c).cloned().unwrap_or(Value::Null))
            .collect();

        let generated = entity.key.filter(|k| k.kind == KeyKind::Identity);
        let output = match (generated, self.profile.key_retrieval) {
            (Some(key), KeyRetrieval::OutputInserted) => {
                format!(" OUTPUT INSERTED.{}", self.profile.quote(key.column))
            }
            _ => String::new(),
        };
        let returning = match (generated, self.profile.key_retrieval) {
            (Some(key), KeyRetrieval::Returning) => {
                format!(" RETURNING {}", self.profile.quote(key.column))
            }
            _ => String::new(),
        };

        let table = self.table_name(entity);
        let sql = if columns.is_empty() {
            format!("INSERT INTO {}{} DEFAULT VALUES{}", table, output, returning)
        } else {
            let column_list = columns
                .iter()
                .map(|c| self.profile.quote(c))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = (1..=columns.len())
                .map(|n| self.profile.placeholder(n))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT INTO {} ({}){} VALUES ({}){}",
                table, column_list, output, placeholders, returning
            )
        };
        (sql, params)
    }

    /// 行を挿入し、キーを返す
    ///
    /// 採番キーは生成された値、呼び出し側指定のキーはその値、キー無しテーブルは `None`
    pub async fn insert(
        &self,
        conn: &mut dyn DatabaseConnection,
        entity: &Entity,
        values: &Record,
    ) -> CrudResult<Option<Value>> {
        let (sql, params) = self.insert_sql(entity, values);
        debug!("SQL: {}", sql);

        match entity.key {
            Some(Key {
                kind: KeyKind::Identity,
                ..
            }) => {
                let result = conn.query(&sql, &params).await?;
                let key = result.first_value().cloned().ok_or_else(|| {
                    DatabaseError::QueryFailed(format!(
                        "insert into {} returned no key",
                        entity.display_name()
                    ))
                })?;
                Ok(Some(key))
            }
            Some(Key {
                column,
                kind: KeyKind::Supplied,
            }) => {
                conn.execute(&sql, &params).await?;
                Ok(Some(values.get(column).cloned().unwrap_or(Value::Null)))
            }
            None => {
                conn.execute(&sql, &params).await?;
                Ok(None)
            }
        }
    }

    pub async fn get(
        &self,
        conn: &mut dyn DatabaseConnection,
        entity: &Entity,
        key: &Value,
    ) -> CrudResult<Option<Record>> {
        let key_column = entity.key()?.column;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            self.select_list(entity),
            self.table_name(entity),
            self.profile.quote(key_column),
            self.profile.placeholder(1)
        );
        debug!("SQL: {}", sql);

        let result = conn.query(&sql, std::slice::from_ref(key)).await?;
        let columns = result.columns;
        Ok(result
            .rows
            .into_iter()
            .next()
            .map(|row| Record::from_row(&columns, row)))
    }

    /// WHERE句（NULL条件は IS NULL）とバインド値
    fn where_clause(
        &self,
        entity: &Entity,
        conditions: &[(&str, Value)],
    ) -> CrudResult<(String, Vec<Value>)> {
        if conditions.is_empty() {
            return Ok((String::new(), Vec::new()));
        }

        let mut parts = Vec::with_capacity(conditions.len());
        let mut params = Vec::new();
        for (column, value) in conditions {
            if !entity.has_column(column) {
                return Err(CrudError::UnknownColumn {
                    table: entity.display_name(),
                    column: column.to_string(),
                });
            }
            if value.is_null() {
                parts.push(format!("{} IS NULL", self.profile.quote(column)));
            } else {
                params.push(value.clone());
                parts.push(format!(
                    "{} = {}",
                    self.profile.quote(column),
                    self.profile.placeholder(params.len())
                ));
            }
        }
        Ok((format!(" WHERE {}", parts.join(" AND ")), params))
    }

    fn order_column(&self, entity: &Entity, order_by: Option<&str>) -> CrudResult<&'static str> {
        match order_by {
            Some(column) => entity
                .selectable()
                .into_iter()
                .find(|c| *c == column)
                .ok_or_else(|| CrudError::UnknownColumn {
                    table: entity.display_name(),
                    column: column.to_string(),
                }),
            None => entity
                .selectable()
                .first()
                .copied()
                .ok_or_else(|| CrudError::InvalidArgument(format!(
                    "{} has no columns",
                    entity.display_name()
                ))),
        }
    }

    async fn fetch(
        &self,
        conn: &mut dyn DatabaseConnection,
        sql: &str,
        params: &[Value],
    ) -> CrudResult<Vec<Record>> {
        debug!("SQL: {}", sql);
        let result = conn.query(sql, params).await?;
        let columns = result.columns;
        Ok(result
            .rows
            .into_iter()
            .map(|row| Record::from_row(&columns, row))
            .collect())
    }

    /// 条件に一致する行をキー順で返す
    pub async fn get_list(
        &self,
        conn: &mut dyn DatabaseConnection,
        entity: &Entity,
        conditions: &[(&str, Value)],
    ) -> CrudResult<Vec<Record>> {
        let (where_clause, params) = self.where_clause(entity, conditions)?;
        let order = self.order_column(entity, None)?;
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}",
            self.select_list(entity),
            self.table_name(entity),
            where_clause,
            self.profile.quote(order)
        );
        self.fetch(conn, &sql, &params).await
    }

    /// ページ単位の一覧（`page` は1始まり）
    pub fn paged_sql(
        &self,
        entity: &Entity,
        page: u32,
        per_page: u32,
        order_by: Option<&str>,
    ) -> CrudResult<String> {
        if page == 0 || per_page == 0 {
            return Err(CrudError::InvalidArgument(format!(
                "page and per_page must be at least 1 (got {} and {})",
                page, per_page
            )));
        }

        let order = self.profile.quote(self.order_column(entity, order_by)?);
        let offset = u64::from(page - 1) * u64::from(per_page);
        let paging = match self.profile.paging {
            PagingSyntax::OffsetFetch => format!(
                "OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                offset, per_page
            ),
            PagingSyntax::LimitOffset => format!("LIMIT {} OFFSET {}", per_page, offset),
        };

        Ok(format!(
            "SELECT {} FROM {} ORDER BY {} {}",
            self.select_list(entity),
            self.table_name(entity),
            order,
            paging
        ))
    }

    pub async fn get_list_paged(
        &self,
        conn: &mut dyn DatabaseConnection,
        entity: &Entity,
        page: u32,
        per_page: u32,
        order_by: Option<&str>,
    ) -> CrudResult<Vec<Record>> {
        let sql = self.paged_sql(entity, page, per_page, order_by)?;
        self.fetch(conn, &sql, &[]).await
    }

    /// `values` に含まれる書き込み可能カラムだけを更新する
    pub async fn update(
        &self,
        conn: &mut dyn DatabaseConnection,
        entity: &Entity,
        key: &Value,
        values: &Record,
    ) -> CrudResult<u64> {
        let key_column = entity.key()?.column;

        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for column in entity.columns.iter().filter(|c| values.contains(c)) {
            params.push(values.get(column).cloned().unwrap_or(Value::Null));
            assignments.push(format!(
                "{} = {}",
                self.profile.quote(column),
                self.profile.placeholder(params.len())
            ));
        }
        if assignments.is_empty() {
            return Err(CrudError::NothingToUpdate(entity.display_name()));
        }

        params.push(key.clone());
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.table_name(entity),
            assignments.join(", "),
            self.profile.quote(key_column),
            self.profile.placeholder(params.len())
        );
        debug!("SQL: {}", sql);

        Ok(conn.execute(&sql, &params).await?.rows_affected)
    }

    pub async fn delete(
        &self,
        conn: &mut dyn DatabaseConnection,
        entity: &Entity,
        key: &Value,
    ) -> CrudResult<u64> {
        let key_column = entity.key()?.column;
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.table_name(entity),
            self.profile.quote(key_column),
            self.profile.placeholder(1)
        );
        debug!("SQL: {}", sql);

        Ok(conn
            .execute(&sql, std::slice::from_ref(key))
            .await?
            .rows_affected)
    }

    pub async fn record_count(
        &self,
        conn: &mut dyn DatabaseConnection,
        entity: &Entity,
    ) -> CrudResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table_name(entity));
        debug!("SQL: {}", sql);

        let result = conn.query(&sql, &[]).await?;
        result
            .first_value()
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                CrudError::Database(DatabaseError::ConversionError(format!(
                    "COUNT(*) on {} did not return an integer",
                    entity.display_name()
                )))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::engines::SqliteEngine;
    use crate::database::DatabaseEngine;
    use crate::dialect::{POSTGRESQL, SQLITE, SQL_SERVER};

    const USERS: Entity = Entity {
        table: "Users",
        schema: None,
        key: Some(Key {
            column: "Id",
            kind: KeyKind::Identity,
        }),
        columns: &["Name", "Age"],
        readonly: &["CreatedDate"],
    };

    const TAGS: Entity = Entity {
        table: "Tags",
        schema: Some("Meta"),
        key: Some(Key {
            column: "Id",
            kind: KeyKind::Supplied,
        }),
        columns: &["Label"],
        readonly: &[],
    };

    #[test]
    fn test_insert_sql_per_dialect() {
        let values = Record::new().with("Name", "Ann").with("Age", 30);

        let (sql, params) = Crud::new(&SQL_SERVER).insert_sql(&USERS, &values);
        assert_eq!(
            sql,
            "INSERT INTO [Users] ([Name], [Age]) OUTPUT INSERTED.[Id] VALUES (@P1, @P2)"
        );
        assert_eq!(params, vec![Value::from("Ann"), Value::Int(30)]);

        let (sql, _) = Crud::new(&POSTGRESQL).insert_sql(&USERS, &values);
        assert_eq!(
            sql,
            "INSERT INTO \"Users\" (\"Name\", \"Age\") VALUES ($1, $2) RETURNING \"Id\""
        );

        let (sql, _) = Crud::new(&SQLITE).insert_sql(&USERS, &values);
        assert_eq!(
            sql,
            "INSERT INTO \"Users\" (\"Name\", \"Age\") VALUES (?, ?) RETURNING \"Id\""
        );
    }

    #[test]
    fn test_supplied_key_is_inserted() {
        let values = Record::new().with("Id", "k1").with("Label", "x");
        let (sql, params) = Crud::new(&SQL_SERVER).insert_sql(&TAGS, &values);
        assert_eq!(
            sql,
            "INSERT INTO [Meta].[Tags] ([Id], [Label]) VALUES (@P1, @P2)"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_paged_sql() {
        let sql = Crud::new(&SQL_SERVER)
            .paged_sql(&USERS, 2, 10, Some("Name"))
            .unwrap();
        assert!(sql.ends_with("ORDER BY [Name] OFFSET 10 ROWS FETCH NEXT 10 ROWS ONLY"));

        let sql = Crud::new(&POSTGRESQL).paged_sql(&USERS, 1, 5, None).unwrap();
        assert!(sql.ends_with("ORDER BY \"Id\" LIMIT 5 OFFSET 0"));
    }

    #[test]
    fn test_paged_sql_rejects_bad_input() {
        let crud = Crud::new(&SQLITE);
        assert!(matches!(
            crud.paged_sql(&USERS, 0, 10, None),
            Err(CrudError::InvalidArgument(_))
        ));
        assert!(matches!(
            crud.paged_sql(&USERS, 1, 10, Some("Nope")),
            Err(CrudError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_record_lookup_ignores_case() {
        let mut record = Record::new().with("Name", "Ann");
        record.set("name", "Bob");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get_str("NAME"), Some("Bob"));
    }

    #[test]
    fn test_from_context_after_set() {
        set_dialect(Dialect::Sqlite);
        assert!(current_dialect().is_some());
        assert!(Crud::from_context().is_ok());
    }

    #[tokio::test]
    async fn test_crud_round_trip_on_sqlite() {
        let mut conn = SqliteEngine.connect("sqlite::memory:").await.unwrap();
        conn.execute(
            "CREATE TABLE \"Users\" (\"Id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"Name\" text NOT NULL, \"Age\" int NOT NULL, \"CreatedDate\" datetime DEFAULT CURRENT_TIMESTAMP NULL)",
            &[],
        )
        .await
        .unwrap();

        let crud = Crud::new(&SQLITE);
        let conn = conn.as_mut();

        let id = crud
            .insert(conn, &USERS, &Record::new().with("Name", "Ann").with("Age", 30))
            .await
            .unwrap()
            .unwrap();
        crud.insert(conn, &USERS, &Record::new().with("Name", "Bob").with("Age", 40))
            .await
            .unwrap();

        let user = crud.get(conn, &USERS, &id).await.unwrap().unwrap();
        assert_eq!(user.get_str("Name"), Some("Ann"));
        assert!(!user.get("CreatedDate").unwrap().is_null());

        let updated = crud
            .update(conn, &USERS, &id, &Record::new().with("Age", 31))
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let thirty_one = crud
            .get_list(conn, &USERS, &[("Age", Value::Int(31))])
            .await
            .unwrap();
        assert_eq!(thirty_one.len(), 1);

        assert_eq!(crud.record_count(conn, &USERS).await.unwrap(), 2);
        assert_eq!(crud.delete(conn, &USERS, &id).await.unwrap(), 1);
        assert!(crud.get(conn, &USERS, &id).await.unwrap().is_none());
    }
}
