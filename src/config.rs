//! Harness configuration
//!
//! 既定値 → 設定ファイル（TOML）→ 環境変数（`CRUD_HARNESS__*`）の順に重ねて読み込む

mod loader;

pub use loader::ConfigLoader;

use crate::dialect::{Dialect, DialectProfile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// アプリケーション全体の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub harness: HarnessSettings,
    pub sqlserver: ServerEndpoint,
    pub postgresql: ServerEndpoint,
    pub sqlite: SqliteSettings,
    pub logging: LoggingConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            harness: HarnessSettings::default(),
            sqlserver: ServerEndpoint::sql_server_default(),
            postgresql: ServerEndpoint::default(),
            sqlite: SqliteSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// 実行する方言（CLI引数で上書き可能）
    pub dialect: Dialect,
    /// 使い捨てテストデータベース名
    pub database_name: String,
    /// GUIDキーのテストを実行するか（既定では除外）
    pub include_guid_tests: bool,
    /// データベース作成後の待機時間（未指定なら方言プロファイルの値）
    pub settle_delay_ms: Option<u64>,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            dialect: Dialect::PostgreSql,
            database_name: "testdbsimplecrud".to_string(),
            include_guid_tests: false,
            settle_delay_ms: None,
        }
    }
}

/// サーバー型エンジンの接続先（既定値は PostgreSQL）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: "passw0rd".to_string(),
        }
    }
}

impl ServerEndpoint {
    pub fn sql_server_default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1433,
            username: "sa".to_string(),
            password: "passw0rd".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteSettings {
    /// データベースファイルを置くディレクトリ
    pub directory: PathBuf,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// ログレベル (trace, debug, info, warn, error) または EnvFilter 形式
    pub level: String,
    pub file_enabled: bool,
    pub log_dir: PathBuf,
    /// JSON形式で出力（ログ収集基盤向け）
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            json: false,
        }
    }
}

/// 1回の実行で使う接続先一式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub dialect: Dialect,
    pub database_name: String,
    /// 管理用接続（SQLiteでは `None`）
    pub admin_url: Option<String>,
    /// テストデータベースへの接続
    pub database_url: String,
    /// ファイルベースのエンジンのデータベースファイル
    pub database_file: Option<PathBuf>,
    pub settle_delay: Duration,
}

impl HarnessConfig {
    pub fn endpoint_for(&self, dialect: Dialect) -> ServerEndpoint {
        match dialect {
            Dialect::SqlServer => self.sqlserver.clone(),
            Dialect::PostgreSql => self.postgresql.clone(),
            Dialect::Sqlite => ServerEndpoint {
                host: String::new(),
                port: 0,
                username: String::new(),
                password: String::new(),
            },
        }
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.sqlite
            .directory
            .join(format!("{}.sqlite", self.harness.database_name))
    }

    /// プロファイルと設定から接続先を解決する
    pub fn target_for(&self, profile: &DialectProfile) -> ConnectionTarget {
        let endpoint = self.endpoint_for(profile.dialect);
        let name = &self.harness.database_name;

        let (admin_url, database_url, database_file) = match profile.admin_database {
            Some(admin) => (
                Some(profile.connection_string(&endpoint, admin)),
                profile.connection_string(&endpoint, name),
                None,
            ),
            None => {
                let path = self.sqlite_path();
                let url = profile.connection_string(&endpoint, &path.to_string_lossy());
                (None, url, Some(path))
            }
        };

        let settle_delay = self
            .harness
            .settle_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(profile.settle_delay);

        ConnectionTarget {
            dialect: profile.dialect,
            database_name: name.clone(),
            admin_url,
            database_url,
            database_file,
            settle_delay,
        }
    }

    /// サンプル設定ファイルの内容を生成
    pub fn sample_toml() -> Result<String, toml::ser::Error> {
        let body = toml::to_string_pretty(&Self::default())?;
        Ok(format!(
            "# crud-harness configuration\n\
             # Save as crud-harness.toml. Environment overrides use CRUD_HARNESS__SECTION__KEY,\n\
             # e.g. CRUD_HARNESS__POSTGRESQL__PASSWORD=secret\n\n{}",
            body
        ))
    }
}
