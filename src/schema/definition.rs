//! 方言に依存しない論理スキーマ定義

/// 論理カラム型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    BigInt,
    /// 可変長文字列（長さ未指定なら方言の既定）
    Text(Option<u32>),
    DateTime,
    Guid,
}

impl ColumnType {
    pub fn is_integer(self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::BigInt)
    }
}

/// カラムの既定値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    CurrentTimestamp,
}

/// 自動採番設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// 最初に払い出される値
    pub seed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    /// 自動採番列は常に主キーとして作成される
    pub identity: Option<Identity>,
}

impl ColumnDefinition {
    pub fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            default: None,
            identity: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn identity(mut self, seed: i64) -> Self {
        self.identity = Some(Identity { seed });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    PrimaryKey {
        name: Option<&'static str>,
        columns: Vec<&'static str>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: &'static str,
    pub schema: Option<&'static str>,
    pub columns: Vec<ColumnDefinition>,
    pub constraints: Vec<Constraint>,
}

impl TableDefinition {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            schema: None,
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn in_schema(mut self, schema: &'static str) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, name: Option<&'static str>, columns: &[&'static str]) -> Self {
        self.constraints.push(Constraint::PrimaryKey {
            name,
            columns: columns.to_vec(),
        });
        self
    }

    pub fn identity_column(&self) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.identity.is_some())
    }

    pub fn display_name(&self) -> String {
        match self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.to_string(),
        }
    }
}

/// テーブル定義の順序付きリスト
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaDefinition {
    pub tables: Vec<TableDefinition>,
}

/// `BigCar` の採番開始値。32ビット符号付き整数の範囲を超える
pub const BIG_IDENTITY_SEED: i64 = 2_147_483_650;

impl SchemaDefinition {
    pub fn new(tables: Vec<TableDefinition>) -> Self {
        Self { tables }
    }

    /// 既定以外のスキーマ（重複なし、出現順）
    pub fn namespaces(&self) -> Vec<&'static str> {
        let mut namespaces = Vec::new();
        for schema in self.tables.iter().filter_map(|t| t.schema) {
            if !namespaces.contains(&schema) {
                namespaces.push(schema);
            }
        }
        namespaces
    }

    /// テストスイートが前提とする標準スキーマ
    pub fn standard() -> Self {
        use ColumnType::*;

        Self::new(vec![
            TableDefinition::new("Users")
                .column(ColumnDefinition::new("Id", Int).identity(1))
                .column(ColumnDefinition::new("Name", Text(Some(100))))
                .column(ColumnDefinition::new("Age", Int))
                .column(ColumnDefinition::new("ScheduledDayOff", Int).nullable())
                .column(
                    ColumnDefinition::new("CreatedDate", DateTime)
                        .nullable()
                        .default_value(DefaultValue::CurrentTimestamp),
                ),
            TableDefinition::new("Car")
                .column(ColumnDefinition::new("CarId", Int).identity(1))
                .column(ColumnDefinition::new("Id", Int).nullable())
                .column(ColumnDefinition::new("Make", Text(Some(100))))
                .column(ColumnDefinition::new("Model", Text(Some(100)))),
            TableDefinition::new("BigCar")
                .column(ColumnDefinition::new("CarId", BigInt).identity(BIG_IDENTITY_SEED))
                .column(ColumnDefinition::new("Make", Text(Some(100))))
                .column(ColumnDefinition::new("Model", Text(Some(100)))),
            TableDefinition::new("City")
                .column(ColumnDefinition::new("Name", Text(Some(100))))
                .column(ColumnDefinition::new("Population", Int)),
            TableDefinition::new("CarLog")
                .in_schema("Log")
                .column(ColumnDefinition::new("Id", Int).identity(1))
                .column(ColumnDefinition::new("LogNotes", Text(Some(100)))),
            TableDefinition::new("GUIDTest")
                .column(ColumnDefinition::new("Id", Guid))
                .column(ColumnDefinition::new("name", Text(Some(50))))
                .primary_key(Some("PK_GUIDTest"), &["Id"]),
            // 予約語と衝突するカラム名（識別子のクォートを検証する）
            TableDefinition::new("StrangeColumnNames")
                .column(ColumnDefinition::new("ItemId", Int).identity(1))
                .column(ColumnDefinition::new("word", Text(Some(100))))
                .column(ColumnDefinition::new("Order", Int))
                .column(ColumnDefinition::new("Group", Text(Some(100))).nullable()),
        ])
    }
}
