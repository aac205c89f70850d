//! Test runner
//!
//! テストケースを登録順に1件ずつ実行する。最初の失敗で打ち切り（fail-fast）、
//! 残りは未実行として数える。

use super::{SkipPolicy, TestCase};
use crate::dialect::Dialect;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// 成功したテスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub name: &'static str,
    pub elapsed: Duration,
}

/// 実行を打ち切ったテスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFailure {
    pub name: &'static str,
    pub message: String,
    pub elapsed: Duration,
}

/// 1回の実行結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub dialect: Dialect,
    /// 成功したテストのみ
    pub entries: Vec<TestOutcome>,
    /// 適用外として実行しなかったテスト（成功にも失敗にも数えない）
    pub skipped: Vec<&'static str>,
    pub failure: Option<TestFailure>,
    pub not_attempted: usize,
    pub total_elapsed: Duration,
}

impl RunReport {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            entries: Vec::new(),
            skipped: Vec::new(),
            failure: None,
            not_attempted: 0,
            total_elapsed: Duration::ZERO,
        }
    }

    pub fn passed(&self) -> usize {
        self.entries.len()
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// `<TestName> failed: <message>; <n> test(s) not attempted`
    pub fn abort_summary(&self) -> Option<String> {
        self.failure.as_ref().map(|failure| {
            format!(
                "{} failed: {}; {} test(s) not attempted",
                failure.name, failure.message, self.not_attempted
            )
        })
    }
}

/// 進捗の出力先
pub trait Reporter {
    fn passed(&mut self, dialect: Dialect, outcome: &TestOutcome);

    fn failed(&mut self, dialect: Dialect, failure: &TestFailure);

    fn skipped(&mut self, _dialect: Dialect, _name: &str, _reason: &str) {}
}

/// `Running <TestName> in <Dialect> - OK! <ms>ms`
pub fn pass_line(dialect: Dialect, outcome: &TestOutcome) -> String {
    format!(
        "Running {} in {} - OK! {}ms",
        outcome.name,
        dialect,
        outcome.elapsed.as_millis()
    )
}

pub fn fail_line(dialect: Dialect, failure: &TestFailure) -> String {
    format!(
        "Running {} in {} - FAILED! {}ms",
        failure.name,
        dialect,
        failure.elapsed.as_millis()
    )
}

/// 進捗行を標準出力に書く
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn passed(&mut self, dialect: Dialect, outcome: &TestOutcome) {
        println!("{}", pass_line(dialect, outcome));
    }

    fn failed(&mut self, dialect: Dialect, failure: &TestFailure) {
        println!("{}", fail_line(dialect, failure));
    }
}

/// 進捗行をメモリに溜める
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub lines: Vec<String>,
}

impl Reporter for CollectingReporter {
    fn passed(&mut self, dialect: Dialect, outcome: &TestOutcome) {
        self.lines.push(pass_line(dialect, outcome));
    }

    fn failed(&mut self, dialect: Dialect, failure: &TestFailure) {
        self.lines.push(fail_line(dialect, failure));
    }

    fn skipped(&mut self, dialect: Dialect, name: &str, reason: &str) {
        self.lines
            .push(format!("Skipping {} in {} ({})", name, dialect, reason));
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

/// テストケースを順に実行して `RunReport` を返す
pub async fn run<S>(
    dialect: Dialect,
    suite: &S,
    cases: &[TestCase<S>],
    skip: &SkipPolicy,
    reporter: &mut dyn Reporter,
) -> RunReport {
    let started = Instant::now();
    let mut report = RunReport::new(dialect);
    info!("🚀 Running {} test case(s) in {}", cases.len(), dialect);

    for (index, case) in cases.iter().enumerate() {
        if let Some(reason) = skip.reason(dialect, case.name) {
            debug!("Skipping {} in {}: {}", case.name, dialect, reason);
            reporter.skipped(dialect, case.name, reason);
            report.skipped.push(case.name);
            continue;
        }

        let case_started = Instant::now();
        let result = AssertUnwindSafe((case.operation)(suite))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(anyhow::anyhow!(panic_message(payload))));
        let elapsed = case_started.elapsed();

        match result {
            Ok(()) => {
                let outcome = TestOutcome {
                    name: case.name,
                    elapsed,
                };
                reporter.passed(dialect, &outcome);
                report.entries.push(outcome);
            }
            Err(e) => {
                let failure = TestFailure {
                    name: case.name,
                    message: format!("{:#}", e),
                    elapsed,
                };
                error!("❌ {} failed in {}: {}", case.name, dialect, failure.message);
                reporter.failed(dialect, &failure);
                report.failure = Some(failure);
                // スキップ対象は未実行に数えない
                report.not_attempted = cases[index + 1..]
                    .iter()
                    .filter(|rest| !skip.should_skip(dialect, rest.name))
                    .count();
                break;
            }
        }
    }

    report.total_elapsed = started.elapsed();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{TestFuture, TestRegistry};
    use std::cell::RefCell;

    /// 呼び出されたテスト名を記録し、指定名で失敗する合成スイート
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<&'static str>>,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn record(&self, name: &'static str) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(name);
            match self.fail_on {
                Some(target) if target == name => anyhow::bail!("boom"),
                _ => Ok(()),
            }
        }
    }

    macro_rules! recorded {
        ($($name:ident),*) => {
            $(
                fn $name(suite: &Recorder) -> TestFuture<'_> {
                    Box::pin(async move { suite.record(stringify!($name)) })
                }
            )*
        };
    }

    recorded!(t1, t2, t3, t4, t5, t6, t7, t8, t9, t10);
    recorded!(insert_with_schema, insert_guid_key, plain);

    fn ten_cases() -> TestRegistry<Recorder> {
        let mut registry = TestRegistry::new();
        let operations: [(&'static str, crate::suite::TestFn<Recorder>); 10] = [
            ("t1", t1),
            ("t2", t2),
            ("t3", t3),
            ("t4", t4),
            ("t5", t5),
            ("t6", t6),
            ("t7", t7),
            ("t8", t8),
            ("t9", t9),
            ("t10", t10),
        ];
        for (name, operation) in operations {
            registry.register(name, operation).unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_all_pass() {
        let suite = Recorder::default();
        let mut reporter = CollectingReporter::default();

        let report = run(
            Dialect::PostgreSql,
            &suite,
            &ten_cases().discover(),
            &SkipPolicy::default(),
            &mut reporter,
        )
        .await;

        assert!(report.is_success());
        assert_eq!(report.passed(), 10);
        assert_eq!(report.not_attempted, 0);
        assert_eq!(reporter.lines.len(), 10);
        assert!(reporter.lines[0].starts_with("Running t1 in PostgreSQL - OK! "));
        assert!(reporter.lines[0].ends_with("ms"));
    }

    #[tokio::test]
    async fn test_fail_fast_on_third_case() {
        let suite = Recorder {
            fail_on: Some("t3"),
            ..Default::default()
        };
        let mut reporter = CollectingReporter::default();

        let report = run(
            Dialect::SqlServer,
            &suite,
            &ten_cases().discover(),
            &SkipPolicy::default(),
            &mut reporter,
        )
        .await;

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.not_attempted, 7);
        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.name, "t3");
        assert_eq!(failure.message, "boom");
        assert_eq!(*suite.calls.borrow(), vec!["t1", "t2", "t3"]);
        assert_eq!(
            report.abort_summary().unwrap(),
            "t3 failed: boom; 7 test(s) not attempted"
        );
        assert!(reporter.lines[2].starts_with("Running t3 in SQL Server - FAILED! "));
    }

    #[tokio::test]
    async fn test_skipped_cases_are_never_invoked() {
        let suite = Recorder::default();
        let mut registry = TestRegistry::new();
        registry.register("insert_with_schema", insert_with_schema).unwrap();
        registry.register("insert_guid_key", insert_guid_key).unwrap();
        registry.register("plain", plain).unwrap();
        let mut reporter = CollectingReporter::default();

        let report = run(
            Dialect::Sqlite,
            &suite,
            &registry.discover(),
            &SkipPolicy::default(),
            &mut reporter,
        )
        .await;

        assert_eq!(*suite.calls.borrow(), vec!["plain"]);
        assert_eq!(report.skipped, vec!["insert_with_schema", "insert_guid_key"]);
        assert_eq!(report.passed(), 1);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_not_attempted_excludes_skippable_cases() {
        let suite = Recorder {
            fail_on: Some("t2"),
            ..Default::default()
        };
        let mut registry = TestRegistry::new();
        registry.register("t1", t1).unwrap();
        registry.register("t2", t2).unwrap();
        registry.register("insert_with_schema", insert_with_schema).unwrap();
        registry.register("insert_guid_key", insert_guid_key).unwrap();
        registry.register("t3", t3).unwrap();

        let report = run(
            Dialect::Sqlite,
            &suite,
            &registry.discover(),
            &SkipPolicy::default(),
            &mut CollectingReporter::default(),
        )
        .await;

        assert_eq!(report.passed(), 1);
        assert_eq!(report.not_attempted, 1);
        assert_eq!(
            report.abort_summary().unwrap(),
            "t2 failed: boom; 1 test(s) not attempted"
        );
    }

    fn panics(_: &Recorder) -> TestFuture<'_> {
        Box::pin(async {
            if suite_is_broken() {
                panic!("unexpected");
            }
            Ok::<(), anyhow::Error>(())
        })
    }

    fn suite_is_broken() -> bool {
        true
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let suite = Recorder::default();
        let mut registry = TestRegistry::new();
        registry.register("panics", panics).unwrap();
        registry.register("plain", plain).unwrap();

        let report = run(
            Dialect::Sqlite,
            &suite,
            &registry.discover(),
            &SkipPolicy::default(),
            &mut CollectingReporter::default(),
        )
        .await;

        let failure = report.failure.unwrap();
        assert_eq!(failure.message, "panicked: unexpected");
        assert_eq!(report.not_attempted, 1);
    }
}
