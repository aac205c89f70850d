//! Test suite
//!
//! 明示的に登録したテストケースの発見・スキップ判定・逐次実行

pub mod cases;
pub mod registry;
pub mod runner;
pub mod skip;

pub use cases::CrudSuite;
pub use registry::{RegistryError, TestRegistry};
pub use runner::{
    run, CollectingReporter, ConsoleReporter, Reporter, RunReport, TestFailure, TestOutcome,
};
pub use skip::SkipPolicy;

use futures::future::LocalBoxFuture;

/// テスト本体が返すフューチャ
pub type TestFuture<'a> = LocalBoxFuture<'a, anyhow::Result<()>>;

/// テスト本体。スイート `S` を借用して実行する
pub type TestFn<S> = for<'a> fn(&'a S) -> TestFuture<'a>;

/// `async fn` のフューチャを `TestFuture` に包む
pub fn boxed<'a, F>(future: F) -> TestFuture<'a>
where
    F: std::future::Future<Output = anyhow::Result<()>> + 'a,
{
    Box::pin(future)
}

/// 名前付きのテストケース
pub struct TestCase<S> {
    pub name: &'static str,
    pub operation: TestFn<S>,
}

impl<S> TestCase<S> {
    pub fn new(name: &'static str, operation: TestFn<S>) -> Self {
        Self { name, operation }
    }
}

impl<S> Clone for TestCase<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for TestCase<S> {}

impl<S> std::fmt::Debug for TestCase<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase").field("name", &self.name).finish()
    }
}

/// `async fn name(suite: &S) -> anyhow::Result<()>` の一覧からレジストリを作る
///
/// ```ignore
/// let registry = test_cases![insert_user, get_user]?;
/// ```
#[macro_export]
macro_rules! test_cases {
    ($($name:ident),* $(,)?) => {
        $crate::suite::TestRegistry::from_cases(vec![
            $(
                $crate::suite::TestCase::new(stringify!($name), |suite| {
                    $crate::suite::boxed($name(suite))
                })
            ),*
        ])
    };
}
