//! Suite registration
//!
//! [`SuiteRegistry`] records suites, tests and hooks as plain data. Nothing
//! runs at registration time; the [`TestRunner`](crate::TestRunner) walks the
//! finished tree later.
//!
//! Nesting is handled with an explicit builder stack: `describe` pushes a
//! fresh frame, runs its body against it, pops it, and attaches the finished
//! suite to the enclosing frame (or the top level).
//!
//! ```ignore
//! let mut registry = SuiteRegistry::new();
//! registry.describe("Users API", |s| {
//!     s.before_each(|ctx| async move {
//!         ctx.set("token", "t-123")
//!     })?;
//!     s.test("lists users", |ctx| async move {
//!         let response = ctx.request().get("/v1/users").await?;
//!         expect(response.status_code).to_be(200)?;
//!         Ok(())
//!     })?;
//!     Ok(())
//! })?;
//! ```

use crate::context::TestContext;
use crate::error::{DslError, DslResult};
use crate::hooks::HookKind;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Test body
pub type TestFn = Arc<dyn Fn(TestContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Hook body; same shape as a test body
pub type HookFn = TestFn;

fn boxed<F, Fut>(f: F) -> TestFn
where
    F: Fn(TestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(f(ctx)) })
}

/// Per-test options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestOptions {
    /// Milliseconds; falls back to the run config, then 30000
    pub timeout: Option<u64>,
    /// Extra attempts after a failure; falls back to the run config, then 0
    pub retry: Option<u32>,
    /// Whether a timed-out attempt may be retried
    pub retry_on_timeout: bool,
    pub skip: bool,
    pub only: bool,
    pub tags: Vec<String>,
}

impl TestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, ms: u64) -> Self {
        self.timeout = Some(ms);
        self
    }

    pub fn retry(mut self, count: u32) -> Self {
        self.retry = Some(count);
        self
    }

    pub fn retry_on_timeout(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }

    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn only(mut self) -> Self {
        self.only = true;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A registered test
#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    pub func: TestFn,
    pub options: TestOptions,
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish()
    }
}

/// Hooks of one suite, each list in registration order
#[derive(Clone, Default)]
pub struct Hooks {
    pub before_all: Vec<HookFn>,
    pub after_all: Vec<HookFn>,
    pub before_each: Vec<HookFn>,
    pub after_each: Vec<HookFn>,
}

impl Hooks {
    /// Hooks of one kind, in registration order
    pub fn get(&self, kind: HookKind) -> &[HookFn] {
        match kind {
            HookKind::BeforeAll => &self.before_all,
            HookKind::AfterAll => &self.after_all,
            HookKind::BeforeEach => &self.before_each,
            HookKind::AfterEach => &self.after_each,
        }
    }

    fn get_mut(&mut self, kind: HookKind) -> &mut Vec<HookFn> {
        match kind {
            HookKind::BeforeAll => &mut self.before_all,
            HookKind::AfterAll => &mut self.after_all,
            HookKind::BeforeEach => &mut self.before_each,
            HookKind::AfterEach => &mut self.after_each,
        }
    }

    fn len(&self) -> usize {
        self.before_all.len() + self.after_all.len() + self.before_each.len() + self.after_each.len()
    }
}

/// A suite: tests, hooks and nested suites
#[derive(Clone, Default)]
pub struct Suite {
    pub name: String,
    pub tests: Vec<TestCase>,
    pub hooks: Hooks,
    pub children: Vec<Suite>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Number of tests in this suite and all nested suites
    pub fn test_count(&self) -> usize {
        self.tests.len() + self.children.iter().map(Suite::test_count).sum::<usize>()
    }

    /// Any test here or below marked `only`
    pub fn has_only(&self) -> bool {
        self.tests.iter().any(|t| t.options.only) || self.children.iter().any(Suite::has_only)
    }
}

impl std::fmt::Debug for Suite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("tests", &self.tests)
            .field("hooks", &self.hooks.len())
            .field("children", &self.children)
            .finish()
    }
}

/// Registry of top-level suites plus the builder stack used while registering
#[derive(Default)]
pub struct SuiteRegistry {
    suites: Vec<Suite>,
    stack: Vec<Suite>,
}

impl SuiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a suite from `body` and attach it to the enclosing suite, or to
    /// the top level when there is none.
    pub fn describe<F>(&mut self, name: impl Into<String>, body: F) -> DslResult<()>
    where
        F: FnOnce(&mut Self) -> DslResult<()>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DslError::EmptySuiteName);
        }

        let depth = self.stack.len();
        self.stack.push(Suite::new(name));
        let outcome = body(self);
        // Unwind frames the body left open when it bailed out early
        self.stack.truncate(depth + 1);
        let suite = match self.stack.pop() {
            Some(suite) => suite,
            None => return outcome,
        };
        outcome?;

        match self.stack.last_mut() {
            Some(parent) => parent.children.push(suite),
            None => self.suites.push(suite),
        }
        Ok(())
    }

    fn current(&mut self, registrar: &'static str) -> DslResult<&mut Suite> {
        self.stack
            .last_mut()
            .ok_or(DslError::OutsideDescribe { registrar })
    }

    /// Register a test with default options
    pub fn test<F, Fut>(&mut self, name: impl Into<String>, f: F) -> DslResult<()>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push_test("test", name.into(), TestOptions::default(), boxed(f))
    }

    /// Register a test with explicit options
    pub fn test_with<F, Fut>(
        &mut self,
        name: impl Into<String>,
        options: TestOptions,
        f: F,
    ) -> DslResult<()>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push_test("test", name.into(), options, boxed(f))
    }

    /// `test` with `skip` set
    pub fn test_skip<F, Fut>(&mut self, name: impl Into<String>, f: F) -> DslResult<()>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push_test("test.skip", name.into(), TestOptions::new().skip(), boxed(f))
    }

    /// `test` with `only` set
    pub fn test_only<F, Fut>(&mut self, name: impl Into<String>, f: F) -> DslResult<()>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push_test("test.only", name.into(), TestOptions::new().only(), boxed(f))
    }

    fn push_test(
        &mut self,
        registrar: &'static str,
        name: String,
        options: TestOptions,
        func: TestFn,
    ) -> DslResult<()> {
        let suite = self.current(registrar)?;
        if name.trim().is_empty() {
            return Err(DslError::EmptyTestName {
                suite: suite.name.clone(),
            });
        }
        suite.tests.push(TestCase {
            name,
            func,
            options,
        });
        Ok(())
    }

    pub fn before_all<F, Fut>(&mut self, f: F) -> DslResult<()>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push_hook(HookKind::BeforeAll, "beforeAll", boxed(f))
    }

    pub fn after_all<F, Fut>(&mut self, f: F) -> DslResult<()>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push_hook(HookKind::AfterAll, "afterAll", boxed(f))
    }

    pub fn before_each<F, Fut>(&mut self, f: F) -> DslResult<()>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push_hook(HookKind::BeforeEach, "beforeEach", boxed(f))
    }

    pub fn after_each<F, Fut>(&mut self, f: F) -> DslResult<()>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push_hook(HookKind::AfterEach, "afterEach", boxed(f))
    }

    fn push_hook(&mut self, kind: HookKind, registrar: &'static str, hook: HookFn) -> DslResult<()> {
        self.current(registrar)?.hooks.get_mut(kind).push(hook);
        Ok(())
    }

    /// Registered top-level suites
    pub fn suites(&self) -> &[Suite] {
        &self.suites
    }

    /// Any registered test marked `only`
    pub fn has_only(&self) -> bool {
        self.suites.iter().any(Suite::has_only)
    }

    pub fn test_count(&self) -> usize {
        self.suites.iter().map(Suite::test_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_: TestContext) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_describe_collects_tests_and_hooks() {
        let mut registry = SuiteRegistry::new();
        registry
            .describe("Users", |s| {
                s.before_all(noop)?;
                s.before_each(noop)?;
                s.before_each(noop)?;
                s.test("lists", noop)?;
                s.test_with("creates", TestOptions::new().timeout(500).retry(2).tag("write"), noop)?;
                s.after_each(noop)?;
                Ok(())
            })
            .unwrap();

        let suite = &registry.suites()[0];
        assert_eq!(suite.name, "Users");
        assert_eq!(suite.tests.len(), 2);
        assert_eq!(suite.hooks.before_each.len(), 2);
        assert_eq!(suite.hooks.get(HookKind::BeforeAll).len(), 1);
        assert_eq!(suite.tests[1].options.timeout, Some(500));
        assert!(suite.tests[1].options.has_tag("write"));
    }

    #[test]
    fn test_nested_describe_builds_independent_suites() {
        let mut registry = SuiteRegistry::new();
        registry
            .describe("Outer", |s| {
                s.test("outer one", noop)?;
                s.describe("Inner", |s| {
                    s.test("inner one", noop)?;
                    s.describe("Innermost", |s| s.test("deep", noop))
                })?;
                s.test("outer two", noop)?;
                Ok(())
            })
            .unwrap();
        registry.describe("Second", |s| s.test("x", noop)).unwrap();

        assert_eq!(registry.suites().len(), 2);
        let outer = &registry.suites()[0];
        assert_eq!(outer.tests.len(), 2);
        assert_eq!(outer.children.len(), 1);
        assert_eq!(outer.children[0].tests[0].name, "inner one");
        assert_eq!(outer.children[0].children[0].name, "Innermost");
        assert_eq!(registry.test_count(), 5);
    }

    #[test]
    fn test_registrars_outside_describe_fail_fast() {
        let mut registry = SuiteRegistry::new();
        assert_eq!(
            registry.test("orphan", noop),
            Err(DslError::OutsideDescribe { registrar: "test" })
        );
        assert_eq!(
            registry.before_each(noop),
            Err(DslError::OutsideDescribe { registrar: "beforeEach" })
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_body_does_not_register_suite() {
        let mut registry = SuiteRegistry::new();
        let result = registry.describe("Broken", |s| {
            s.describe("Child", |s| s.test("", noop))
        });
        assert!(matches!(result, Err(DslError::EmptyTestName { .. })));
        assert!(registry.is_empty());

        // The stack is clean again
        assert!(registry.test("orphan", noop).is_err());
    }

    #[test]
    fn test_only_and_skip_sugar() {
        let mut registry = SuiteRegistry::new();
        registry
            .describe("S", |s| {
                s.test_skip("skipped", noop)?;
                s.describe("Nested", |s| s.test_only("focused", noop))
            })
            .unwrap();

        assert!(registry.has_only());
        assert!(registry.suites()[0].tests[0].options.skip);
    }
}
