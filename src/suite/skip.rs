//! 方言ごとのテスト適用可否

use crate::dialect::Dialect;

/// テスト名と方言から、そのテストを実行しないかを判定する
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipPolicy {
    /// GUIDキーのテストを実行する（既定は除外）
    pub include_guid_tests: bool,
}

impl SkipPolicy {
    pub fn new(include_guid_tests: bool) -> Self {
        Self { include_guid_tests }
    }

    pub fn should_skip(&self, dialect: Dialect, name: &str) -> bool {
        self.reason(dialect, name).is_some()
    }

    /// スキップする場合はその理由
    pub fn reason(&self, dialect: Dialect, name: &str) -> Option<&'static str> {
        let lowered = name.to_ascii_lowercase();
        if dialect == Dialect::Sqlite && lowered.contains("schema") {
            return Some("SQLite has no schema namespaces");
        }
        if !self.include_guid_tests && lowered.contains("guid") {
            return Some("GUID tests are disabled");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_tests_skip_only_on_sqlite() {
        let policy = SkipPolicy::default();
        assert!(policy.should_skip(Dialect::Sqlite, "insert_with_Schema"));
        assert!(!policy.should_skip(Dialect::PostgreSql, "insert_with_schema"));
        assert!(!policy.should_skip(Dialect::SqlServer, "insert_with_schema"));
    }

    #[test]
    fn test_guid_tests_skip_everywhere_by_default() {
        let policy = SkipPolicy::default();
        for dialect in Dialect::all() {
            assert!(policy.should_skip(*dialect, "insert_GUID_key"));
        }
    }

    #[test]
    fn test_guid_tests_can_be_enabled() {
        let policy = SkipPolicy::new(true);
        assert!(!policy.should_skip(Dialect::PostgreSql, "insert_guid_key"));
        // スキーマ規則は引き続き有効
        assert!(policy.should_skip(Dialect::Sqlite, "schema_guid"));
    }

    #[test]
    fn test_ordinary_names_run() {
        let policy = SkipPolicy::default();
        assert_eq!(policy.reason(Dialect::Sqlite, "insert_user"), None);
    }
}
