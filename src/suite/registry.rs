//! Test discovery
//!
//! 実行時リフレクションの代わりに、起動時に組み立てる順序付きレジストリ。
//! 登録されていない関数（ヘルパーなど）がテストとして走ることはない。

use super::{TestCase, TestFn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Test case {0} is registered more than once")]
    DuplicateName(&'static str),

    #[error("Test case name cannot be empty")]
    EmptyName,
}

pub struct TestRegistry<S> {
    cases: Vec<TestCase<S>>,
}

impl<S> TestRegistry<S> {
    pub fn new() -> Self {
        Self { cases: Vec::new() }
    }

    pub fn from_cases(cases: Vec<TestCase<S>>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for case in cases {
            registry.register(case.name, case.operation)?;
        }
        Ok(registry)
    }

    /// 末尾に追加する。同名のケースは拒否
    pub fn register(&mut self, name: &'static str, operation: TestFn<S>) -> Result<(), RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.cases.iter().any(|c| c.name == name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.cases.push(TestCase::new(name, operation));
        Ok(())
    }

    /// 登録順のテストケース
    pub fn discover(&self) -> Vec<TestCase<S>> {
        self.cases.clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.cases.iter().map(|c| c.name).collect()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

impl<S> Default for TestRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::TestFuture;
    use futures::FutureExt;

    struct Suite;

    fn pass(_: &Suite) -> TestFuture<'_> {
        async { Ok(()) }.boxed_local()
    }

    async fn first_case(_: &Suite) -> anyhow::Result<()> {
        Ok(())
    }

    async fn second_case(_: &Suite) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_discovery_is_deterministic() {
        let mut registry = TestRegistry::new();
        registry.register("b", pass).unwrap();
        registry.register("a", pass).unwrap();
        registry.register("c", pass).unwrap();

        let first: Vec<_> = registry.discover().iter().map(|c| c.name).collect();
        let second: Vec<_> = registry.discover().iter().map(|c| c.name).collect();
        assert_eq!(first, vec!["b", "a", "c"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut registry = TestRegistry::new();
        registry.register("insert", pass).unwrap();
        assert_eq!(
            registry.register("insert", pass),
            Err(RegistryError::DuplicateName("insert"))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut registry: TestRegistry<Suite> = TestRegistry::new();
        assert_eq!(registry.register(" ", pass), Err(RegistryError::EmptyName));
    }

    #[test]
    fn test_macro_registers_in_order() {
        let registry: TestRegistry<Suite> = crate::test_cases![first_case, second_case].unwrap();
        assert_eq!(registry.names(), vec!["first_case", "second_case"]);
    }

    #[test]
    fn test_macro_rejects_duplicates() {
        let result: Result<TestRegistry<Suite>, _> = crate::test_cases![first_case, first_case];
        assert!(matches!(result, Err(RegistryError::DuplicateName("first_case"))));
    }
}
