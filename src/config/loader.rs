use super::HarnessConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    config_file: Option<String>,
    load_env: bool,
    overrides: Vec<(String, String)>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_file: None,
            load_env: false,
            overrides: Vec::new(),
        }
    }

    /// Load configuration from file
    ///
    /// 明示的に指定されたファイルは必須。未指定なら標準の場所を探す
    pub fn load_from_file(mut self, path: Option<&str>) -> Self {
        self.config_file = path.map(String::from);
        self
    }

    /// Load configuration from environment variables (`CRUD_HARNESS__SECTION__KEY`)
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// CLI引数による上書き（`harness.dialect` のようなドット区切りキー）
    pub fn set_override(mut self, key: &str, value: impl Into<String>) -> Self {
        self.overrides.push((key.to_string(), value.into()));
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<HarnessConfig> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&HarnessConfig::default())
                .context("Failed to serialize default configuration")?,
        );

        if let Some(config_path) = &self.config_file {
            builder = builder.add_source(File::with_name(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::with_name("crud-harness").required(false))
                .add_source(File::with_name("config/crud-harness").required(false));
        }

        if self.load_env {
            builder = builder.add_source(
                Environment::with_prefix("CRUD_HARNESS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        for (key, value) in &self.overrides {
            builder = builder
                .set_override(key.as_str(), value.as_str())
                .with_context(|| format!("Invalid override for {}", key))?;
        }

        let config: HarnessConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use std::io::Write;

    #[test]
    fn test_file_values_layer_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[harness]
dialect = "sqlite"
database_name = "scratch"

[sqlserver]
host = "mssql.local"
"#
        )
        .unwrap();

        let config = ConfigLoader::new()
            .load_from_file(file.path().to_str())
            .build()
            .unwrap();

        assert_eq!(config.harness.dialect, Dialect::Sqlite);
        assert_eq!(config.harness.database_name, "scratch");
        assert_eq!(config.sqlserver.host, "mssql.local");
        // ファイルに無いキーは既定値のまま
        assert_eq!(config.sqlserver.port, 1433);
        assert_eq!(config.sqlserver.username, "sa");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ConfigLoader::new()
            .load_from_file(Some("/nonexistent/crud-harness.toml"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_win() {
        let config = ConfigLoader::new()
            .set_override("harness.dialect", "sqlserver")
            .set_override("logging.level", "debug")
            .build()
            .unwrap();

        assert_eq!(config.harness.dialect, Dialect::SqlServer);
        assert_eq!(config.logging.level, "debug");
    }
}
