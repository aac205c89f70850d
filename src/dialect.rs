//! Dialect catalog
//!
//! サポートする方言（SQL Server / PostgreSQL / SQLite）と、その識別子・DDL上の癖を列挙する。
//! プロファイルは不変で、ネットワークアクセスや副作用を持たない。

use crate::config::ServerEndpoint;
use crate::error::{Error, Result};
use crate::schema::ddl::{DdlTranslator, PostgresDdl, SqlServerDdl, SqliteDdl};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// データベース方言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    SqlServer,
    PostgreSql,
    Sqlite,
}

impl Dialect {
    /// サポートされる全方言（安定した順序）
    pub fn all() -> &'static [Dialect] {
        &[Dialect::SqlServer, Dialect::PostgreSql, Dialect::Sqlite]
    }

    pub fn profile(self) -> &'static DialectProfile {
        match self {
            Dialect::SqlServer => &SQL_SERVER,
            Dialect::PostgreSql => &POSTGRESQL,
            Dialect::Sqlite => &SQLITE,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.profile().name)
    }
}

impl std::str::FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        profile_for(s).map(|p| p.dialect)
    }
}

/// 自動採番列の構文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySyntax {
    /// `INT IDENTITY(seed, 1)`
    Identity,
    /// `SERIAL` / `BIGSERIAL`（シードは後続の setval で設定）
    Serial,
    /// `INTEGER PRIMARY KEY AUTOINCREMENT`（シードは sqlite_sequence で設定）
    Autoincrement,
}

/// 生成キーの取得方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRetrieval {
    /// `INSERT INTO t (..) OUTPUT INSERTED.key VALUES (..)`
    OutputInserted,
    /// `INSERT INTO t (..) VALUES (..) RETURNING key`
    Returning,
}

/// ページングの構文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingSyntax {
    /// `OFFSET n ROWS FETCH NEXT m ROWS ONLY`
    OffsetFetch,
    /// `LIMIT m OFFSET n`
    LimitOffset,
}

/// パラメータのプレースホルダ形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `@P1`
    AtP,
    /// `$1`
    Dollar,
    /// `?`
    Question,
}

/// 方言プロファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectProfile {
    pub dialect: Dialect,
    /// 表示名（進捗行で使用）
    pub name: &'static str,
    /// `{host} {port} {user} {password} {database}` を含む接続文字列テンプレート
    pub connection_template: &'static str,
    /// 管理用接続先データベース（SQLiteはファイルなので無し）
    pub admin_database: Option<&'static str>,
    pub quote: (char, char),
    pub identity: IdentitySyntax,
    pub key_retrieval: KeyRetrieval,
    pub paging: PagingSyntax,
    pub params: ParamStyle,
    /// CREATE SCHEMA によるスキーマ（名前空間）をサポートするか
    pub supports_schemas: bool,
    /// データベース作成後、最初の接続までの待機時間
    pub settle_delay: Duration,
}

pub static SQL_SERVER: DialectProfile = DialectProfile {
    dialect: Dialect::SqlServer,
    name: "SQL Server",
    connection_template:
        "server=tcp:{host},{port};user id={user};password={password};database={database};TrustServerCertificate=true",
    admin_database: Some("master"),
    quote: ('[', ']'),
    identity: IdentitySyntax::Identity,
    key_retrieval: KeyRetrieval::OutputInserted,
    paging: PagingSyntax::OffsetFetch,
    params: ParamStyle::AtP,
    supports_schemas: true,
    settle_delay: Duration::ZERO,
};

pub static POSTGRESQL: DialectProfile = DialectProfile {
    dialect: Dialect::PostgreSql,
    name: "PostgreSQL",
    connection_template: "postgres://{user}:{password}@{host}:{port}/{database}",
    admin_database: Some("postgres"),
    quote: ('"', '"'),
    identity: IdentitySyntax::Serial,
    key_retrieval: KeyRetrieval::Returning,
    paging: PagingSyntax::LimitOffset,
    params: ParamStyle::Dollar,
    supports_schemas: true,
    // 作成直後の接続が "database does not exist" で失敗することがある
    settle_delay: Duration::from_millis(1000),
};

pub static SQLITE: DialectProfile = DialectProfile {
    dialect: Dialect::Sqlite,
    name: "SQLite",
    connection_template: "sqlite://{database}",
    admin_database: None,
    quote: ('"', '"'),
    identity: IdentitySyntax::Autoincrement,
    key_retrieval: KeyRetrieval::Returning,
    paging: PagingSyntax::LimitOffset,
    params: ParamStyle::Question,
    supports_schemas: false,
    settle_delay: Duration::ZERO,
};

/// 方言名からプロファイルを取得
pub fn profile_for(name: &str) -> Result<&'static DialectProfile> {
    let normalized = name.trim().to_ascii_lowercase();
    let dialect = match normalized.as_str() {
        "sqlserver" | "sql server" | "sql-server" | "mssql" => Dialect::SqlServer,
        "postgresql" | "postgres" | "pg" => Dialect::PostgreSql,
        "sqlite" | "sqlite3" => Dialect::Sqlite,
        _ => return Err(Error::UnsupportedDialect(name.to_string())),
    };
    Ok(dialect.profile())
}

impl DialectProfile {
    /// 識別子をクォートする。閉じクォートは二重化してエスケープ
    pub fn quote(&self, ident: &str) -> String {
        let (open, close) = self.quote;
        let escaped = ident.replace(close, &format!("{close}{close}"));
        format!("{open}{escaped}{close}")
    }

    /// スキーマ修飾付きのテーブル名。スキーマ非対応エンジンではテーブル名のみ
    pub fn qualified(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(schema) if self.supports_schemas => {
                format!("{}.{}", self.quote(schema), self.quote(table))
            }
            _ => self.quote(table),
        }
    }

    /// n番目（1始まり）のパラメータ
    pub fn placeholder(&self, n: usize) -> String {
        match self.params {
            ParamStyle::AtP => format!("@P{n}"),
            ParamStyle::Dollar => format!("${n}"),
            ParamStyle::Question => "?".to_string(),
        }
    }

    /// 接続文字列を組み立てる
    ///
    /// SQLiteでは `database` がファイルパスになり、エンドポイントは使わない。
    /// ユーザー名・パスワード・データベース名は方言の形式でエスケープする
    /// （PostgreSQL はパーセントエンコード、SQL Server は ADO.NET のエスケープ）。
    pub fn connection_string(&self, endpoint: &ServerEndpoint, database: &str) -> String {
        let port = endpoint.port.to_string();
        let mut rendered = String::with_capacity(self.connection_template.len() + 32);
        let mut rest = self.connection_template;

        // 置換後の値を再走査しないよう、テンプレートは一度だけ走査する
        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let Some(len) = rest[start..].find('}') else {
                rest = &rest[start..];
                break;
            };
            let placeholder = &rest[start + 1..start + len];
            match placeholder {
                "host" => rendered.push_str(&endpoint.host),
                "port" => rendered.push_str(&port),
                "user" => rendered.push_str(&self.escape_value(&endpoint.username)),
                "password" => rendered.push_str(&self.escape_value(&endpoint.password)),
                "database" => rendered.push_str(&self.escape_value(database)),
                _ => rendered.push_str(&rest[start..=start + len]),
            }
            rest = &rest[start + len + 1..];
        }
        rendered.push_str(rest);
        rendered
    }

    fn escape_value(&self, value: &str) -> String {
        match self.dialect {
            Dialect::SqlServer => escape_ado_value(value),
            Dialect::PostgreSql => urlencoding::encode(value).into_owned(),
            Dialect::Sqlite => value.to_string(),
        }
    }

    /// この方言のDDLトランスレータ
    pub fn translator(&self) -> &'static dyn DdlTranslator {
        match self.dialect {
            Dialect::SqlServer => &SqlServerDdl,
            Dialect::PostgreSql => &PostgresDdl,
            Dialect::Sqlite => &SqliteDdl,
        }
    }
}

/// ADO.NET 接続文字列の値をエスケープ
///
/// `{..}` は最初の `}` で閉じるため、`}` の並びだけは `".."` で囲む。
/// tiberius はエスケープ済みの断片を連結して一つの値にする。
fn escape_ado_value(value: &str) -> String {
    #[derive(PartialEq)]
    enum Run {
        None,
        Braced,
        Quoted,
    }

    let mut escaped = String::with_capacity(value.len() + 2);
    let mut run = Run::None;
    for c in value.chars() {
        let wanted = if c == '}' { Run::Quoted } else { Run::Braced };
        if run != wanted {
            match run {
                Run::Braced => escaped.push('}'),
                Run::Quoted => escaped.push('"'),
                Run::None => {}
            }
            escaped.push(if wanted == Run::Quoted { '"' } else { '{' });
            run = wanted;
        }
        escaped.push(c);
    }
    match run {
        Run::Braced => escaped.push('}'),
        Run::Quoted => escaped.push('"'),
        Run::None => {}
    }
    escaped
}
