//! Schema provisioner
//!
//! 使い捨てテストデータベースの作成・スキーマ構築・削除。
//! 各操作は自分で接続を開いて閉じる。

use super::{ProvisioningError, SchemaDefinition};
use crate::config::ConnectionTarget;
use crate::database::{engine_for, DatabaseConnection, DatabaseEngine, DatabaseError};
use crate::dialect::DialectProfile;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// テストデータベースのライフサイクル操作
#[async_trait]
pub trait Provision: Send + Sync {
    /// 既存のデータベースを削除してから新規作成する
    async fn create_database(&self, profile: &DialectProfile) -> Result<(), ProvisioningError>;

    /// 作成済みデータベースにスキーマ定義を適用する
    async fn create_schema(
        &self,
        profile: &DialectProfile,
        definition: &SchemaDefinition,
    ) -> Result<(), ProvisioningError>;

    /// データベースを削除する（存在しなければ何もしない）
    async fn drop_database(&self, profile: &DialectProfile) -> Result<(), ProvisioningError>;
}

/// 実際のデータベースに対するプロビジョナ
pub struct SchemaProvisioner {
    target: ConnectionTarget,
    engine: Arc<dyn DatabaseEngine>,
}

impl SchemaProvisioner {
    pub fn new(target: ConnectionTarget) -> Self {
        let engine = engine_for(target.dialect);
        Self { target, engine }
    }

    /// 任意のエンジンで構築する
    pub fn with_engine(target: ConnectionTarget, engine: Arc<dyn DatabaseEngine>) -> Self {
        Self { target, engine }
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// スキーマ定義を方言のDDL文に変換する（名前空間 → テーブルの順）
    ///
    /// 1文でも変換できなければ何も返さない
    pub fn plan(
        profile: &DialectProfile,
        definition: &SchemaDefinition,
    ) -> Result<Vec<String>, ProvisioningError> {
        let translator = profile.translator();
        let mut statements: Vec<String> = definition
            .namespaces()
            .into_iter()
            .filter_map(|schema| translator.create_namespace(schema))
            .collect();

        for table in &definition.tables {
            statements.extend(translator.create_table(table)?);
        }
        Ok(statements)
    }

    async fn admin_connection(&self) -> Result<Box<dyn DatabaseConnection>, ProvisioningError> {
        let url = self.target.admin_url.as_deref().ok_or_else(|| {
            DatabaseError::ConfigurationError(format!(
                "{} has no administrative database",
                self.target.dialect
            ))
        })?;
        Ok(self.engine.connect(url).await?)
    }

    async fn run_drop_statements(
        &self,
        connection: &mut dyn DatabaseConnection,
        profile: &DialectProfile,
    ) -> Result<(), ProvisioningError> {
        for sql in profile
            .translator()
            .drop_database(&self.target.database_name)
        {
            match connection.execute(&sql, &[]).await {
                Ok(_) => {}
                Err(e) if e.is_missing_object() => {
                    debug!("Drop skipped ({}): {}", self.target.database_name, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// 接続を閉じてから処理結果を返す。クローズの失敗は警告のみ
async fn close_after<T>(
    connection: Box<dyn DatabaseConnection>,
    result: Result<T, ProvisioningError>,
) -> Result<T, ProvisioningError> {
    if let Err(e) = connection.close().await {
        warn!("Failed to close connection: {}", e);
    }
    result
}

/// データベースファイルと付随ファイル（-wal, -shm）を削除
fn remove_database_files(path: &Path) -> Result<(), ProvisioningError> {
    let mut candidates = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        candidates.push(name.into());
    }

    for file in candidates {
        match std::fs::remove_file(&file) {
            Ok(()) => debug!("Removed {}", file.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[async_trait]
impl Provision for SchemaProvisioner {
    async fn create_database(&self, profile: &DialectProfile) -> Result<(), ProvisioningError> {
        info!(
            "🛠️  Creating database {} ({})",
            self.target.database_name, profile.name
        );

        if let Some(path) = &self.target.database_file {
            remove_database_files(path)?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let connection = self.engine.connect(&self.target.database_url).await?;
            connection.close().await?;
            return Ok(());
        }

        let mut connection = self.admin_connection().await?;
        let result = async {
            self.run_drop_statements(connection.as_mut(), profile).await?;
            if let Some(sql) = profile
                .translator()
                .create_database(&self.target.database_name)
            {
                connection.execute(&sql, &[]).await?;
            }
            Ok::<(), ProvisioningError>(())
        }
        .await;
        close_after(connection, result).await?;

        if !self.target.settle_delay.is_zero() {
            debug!("Waiting {:?} for the new database", self.target.settle_delay);
            tokio::time::sleep(self.target.settle_delay).await;
        }
        Ok(())
    }

    async fn create_schema(
        &self,
        profile: &DialectProfile,
        definition: &SchemaDefinition,
    ) -> Result<(), ProvisioningError> {
        let statements = Self::plan(profile, definition)?;
        info!(
            "📐 Creating {} tables in {}",
            definition.tables.len(),
            self.target.database_name
        );

        let mut connection = self.engine.connect(&self.target.database_url).await?;
        let result = async {
            for sql in &statements {
                debug!("DDL: {}", sql);
                connection.execute(sql, &[]).await?;
            }
            Ok::<(), ProvisioningError>(())
        }
        .await;
        close_after(connection, result).await
    }

    async fn drop_database(&self, profile: &DialectProfile) -> Result<(), ProvisioningError> {
        info!("🧹 Dropping database {}", self.target.database_name);

        if let Some(path) = &self.target.database_file {
            return remove_database_files(path);
        }

        let mut connection = self.admin_connection().await?;
        let result = self.run_drop_statements(connection.as_mut(), profile).await;
        close_after(connection, result).await
    }
}
