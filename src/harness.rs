//! Harness orchestrator
//!
//! 1つの方言について「プロビジョニング → 方言設定 → 実行 → 後片付け → 報告」を駆動する。
//! 後片付けは実行結果に関わらず必ず1回行う。

use crate::crud;
use crate::dialect::DialectProfile;
use crate::error::{Error, Result};
use crate::schema::{Provision, SchemaDefinition};
use crate::suite::{run, Reporter, RunReport, SkipPolicy, TestRegistry};
use tracing::{debug, info, warn};

/// ライフサイクル状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Idle,
    Provisioning,
    DialectSelected,
    Running,
    TearingDown,
    Done,
    Failed,
}

/// 1回の実行の最終結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessOutcome {
    pub report: RunReport,
    /// テストデータベースの削除に失敗した場合のメッセージ
    pub teardown_warning: Option<String>,
}

impl HarnessOutcome {
    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }
}

pub struct Harness<P: Provision> {
    provisioner: P,
    state: HarnessState,
    history: Vec<HarnessState>,
}

impl<P: Provision> Harness<P> {
    pub fn new(provisioner: P) -> Self {
        Self {
            provisioner,
            state: HarnessState::Idle,
            history: vec![HarnessState::Idle],
        }
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// これまでの状態遷移（初期状態を含む）
    pub fn history(&self) -> &[HarnessState] {
        &self.history
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    fn transition(&mut self, next: HarnessState) {
        debug!("Harness state: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// ベストエフォートの削除。失敗はメッセージとして返す
    async fn teardown(&self, profile: &DialectProfile) -> Option<String> {
        match self.provisioner.drop_database(profile).await {
            Ok(()) => None,
            Err(e) => {
                warn!("⚠️  Failed to drop the {} test database: {}", profile.name, e);
                Some(e.to_string())
            }
        }
    }

    /// 1方言分のテストを実行する
    ///
    /// プロビジョニングの失敗はそのままエラーとして返す。テストの失敗は
    /// `HarnessOutcome::report` に記録される。
    pub async fn run<S>(
        &mut self,
        profile: &'static DialectProfile,
        definition: &SchemaDefinition,
        registry: &TestRegistry<S>,
        suite: &S,
        skip: &SkipPolicy,
        reporter: &mut dyn Reporter,
    ) -> Result<HarnessOutcome> {
        if self.state != HarnessState::Idle {
            return Err(Error::InvalidState(format!(
                "harness has already run (state: {:?})",
                self.state
            )));
        }

        self.transition(HarnessState::Provisioning);
        let provisioned = match self.provisioner.create_database(profile).await {
            Ok(()) => self.provisioner.create_schema(profile, definition).await,
            Err(e) => Err(e),
        };
        if let Err(e) = provisioned {
            self.transition(HarnessState::Failed);
            warn!("❌ Provisioning {} failed: {}", profile.name, e);
            self.teardown(profile).await;
            return Err(e.into());
        }

        crud::set_dialect(profile.dialect);
        self.transition(HarnessState::DialectSelected);

        self.transition(HarnessState::Running);
        let cases = registry.discover();
        let report = run(profile.dialect, suite, &cases, skip, reporter).await;

        self.transition(HarnessState::TearingDown);
        let teardown_warning = self.teardown(profile).await;

        self.transition(HarnessState::Done);
        info!(
            "✅ {}: {} passed, {} skipped, {} not attempted",
            profile.name,
            report.passed(),
            report.skipped.len(),
            report.not_attempted
        );

        Ok(HarnessOutcome {
            report,
            teardown_warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseError;
    use crate::dialect::{Dialect, POSTGRESQL};
    use crate::schema::ProvisioningError;
    use crate::suite::{CollectingReporter, TestFn, TestFuture};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockProvisioner {
        fail_create: bool,
        fail_schema: bool,
        fail_drop: bool,
        creates: AtomicUsize,
        schemas: AtomicUsize,
        drops: AtomicUsize,
    }

    #[async_trait]
    impl Provision for MockProvisioner {
        async fn create_database(&self, _: &DialectProfile) -> std::result::Result<(), ProvisioningError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.fail_create {
                return Err(DatabaseError::ConnectionFailed("login failed".to_string()).into());
            }
            Ok(())
        }

        async fn create_schema(
            &self,
            _: &DialectProfile,
            _: &SchemaDefinition,
        ) -> std::result::Result<(), ProvisioningError> {
            self.schemas.fetch_add(1, Ordering::SeqCst);
            if self.fail_schema {
                return Err(ProvisioningError::Translation {
                    table: "Users".to_string(),
                    reason: "broken".to_string(),
                });
            }
            Ok(())
        }

        async fn drop_database(&self, _: &DialectProfile) -> std::result::Result<(), ProvisioningError> {
            self.drops.fetch_add(1, Ordering::SeqCst);
            if self.fail_drop {
                return Err(DatabaseError::QueryFailed("database is in use".to_string()).into());
            }
            Ok(())
        }
    }

    struct Suite;

    fn pass(_: &Suite) -> TestFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn fail(_: &Suite) -> TestFuture<'_> {
        Box::pin(async { Err(anyhow::anyhow!("assertion failed")) })
    }

    /// 3番目が失敗する10件
    fn registry() -> TestRegistry<Suite> {
        const NAMES: [&str; 10] = ["c1", "c2", "c3", "c4", "c5", "c6", "c7", "c8", "c9", "c10"];
        let mut registry = TestRegistry::new();
        for (index, name) in NAMES.into_iter().enumerate() {
            let operation: TestFn<Suite> = if index == 2 { fail } else { pass };
            registry.register(name, operation).unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_fail_fast_still_tears_down_once() {
        let mut harness = Harness::new(MockProvisioner::default());
        let mut reporter = CollectingReporter::default();

        let outcome = harness
            .run(
                &POSTGRESQL,
                &SchemaDefinition::standard(),
                &registry(),
                &Suite,
                &SkipPolicy::default(),
                &mut reporter,
            )
            .await
            .unwrap();

        assert_eq!(outcome.report.entries.len(), 2);
        assert_eq!(outcome.report.not_attempted, 7);
        assert!(!outcome.is_success());
        assert_eq!(outcome.teardown_warning, None);
        assert_eq!(harness.provisioner().drops.load(Ordering::SeqCst), 1);
        assert_eq!(
            harness.history(),
            &[
                HarnessState::Idle,
                HarnessState::Provisioning,
                HarnessState::DialectSelected,
                HarnessState::Running,
                HarnessState::TearingDown,
                HarnessState::Done,
            ]
        );
        assert!(crud::current_dialect().is_some());
    }

    #[tokio::test]
    async fn test_provisioning_failure_is_fatal() {
        let mut harness = Harness::new(MockProvisioner {
            fail_schema: true,
            ..Default::default()
        });

        let err = harness
            .run(
                &POSTGRESQL,
                &SchemaDefinition::standard(),
                &registry(),
                &Suite,
                &SkipPolicy::default(),
                &mut CollectingReporter::default(),
            )
            .await
            .unwrap_err();

        assert!(err.is_provisioning());
        assert_eq!(harness.state(), HarnessState::Failed);
        // ベストエフォートの削除は試みる
        assert_eq!(harness.provisioner().drops.load(Ordering::SeqCst), 1);
        assert!(!harness.history().contains(&HarnessState::Running));
    }

    #[tokio::test]
    async fn test_create_database_failure_skips_schema_and_tests() {
        let mut harness = Harness::new(MockProvisioner {
            fail_create: true,
            ..Default::default()
        });
        let mut reporter = CollectingReporter::default();

        let err = harness
            .run(
                &POSTGRESQL,
                &SchemaDefinition::standard(),
                &registry(),
                &Suite,
                &SkipPolicy::default(),
                &mut reporter,
            )
            .await
            .unwrap_err();

        assert!(err.is_provisioning());
        assert!(err.to_string().contains("login failed"));
        assert_eq!(harness.provisioner().schemas.load(Ordering::SeqCst), 0);
        assert_eq!(harness.provisioner().drops.load(Ordering::SeqCst), 1);
        assert!(reporter.lines.is_empty());
        assert_eq!(
            harness.history(),
            &[HarnessState::Idle, HarnessState::Provisioning, HarnessState::Failed]
        );
    }

    #[tokio::test]
    async fn test_drop_failure_becomes_warning() {
        let mut harness = Harness::new(MockProvisioner {
            fail_drop: true,
            ..Default::default()
        });
        let mut single = TestRegistry::new();
        single.register("only", pass).unwrap();

        let outcome = harness
            .run(
                &POSTGRESQL,
                &SchemaDefinition::standard(),
                &single,
                &Suite,
                &SkipPolicy::default(),
                &mut CollectingReporter::default(),
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert!(outcome
            .teardown_warning
            .as_deref()
            .is_some_and(|w| w.contains("database is in use")));
        assert_eq!(harness.state(), HarnessState::Done);
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let mut harness = Harness::new(MockProvisioner::default());
        let registry = registry();
        let skip = SkipPolicy::default();
        let definition = SchemaDefinition::standard();

        harness
            .run(&POSTGRESQL, &definition, &registry, &Suite, &skip, &mut CollectingReporter::default())
            .await
            .unwrap();
        let err = harness
            .run(&POSTGRESQL, &definition, &registry, &Suite, &skip, &mut CollectingReporter::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(harness.provisioner().creates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_outcome_reports_dialect() {
        let outcome = HarnessOutcome {
            report: RunReport::new(Dialect::Sqlite),
            teardown_warning: None,
        };
        assert!(outcome.is_success());
        assert_eq!(outcome.report.dialect, Dialect::Sqlite);
    }
}
