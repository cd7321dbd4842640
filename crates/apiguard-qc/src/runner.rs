//! Test runner - filtering, hooks, timeout, retry and bail
//!
//! Suites run strictly sequentially. Within a suite the order is:
//!
//! 1. `beforeAll` hooks, once, in registration order
//! 2. for each selected test: ancestor and own `beforeEach` hooks (outer
//!    first), the body (raced against its timeout, retried on failure),
//!    then `afterEach` hooks (inner first), which always run
//! 3. nested suites, recursively
//! 4. `afterAll` hooks, once, in registration order
//!
//! A failing hook is fatal to the rest of its suite but not to sibling
//! suites. Test bodies and hooks run on their own tokio task so a timeout
//! can abandon them and a panic is reported instead of unwinding the run.

use crate::collector::{ResultCollector, RunResults, TestResult};
use crate::config::{RunConfig, DEFAULT_TIMEOUT_MS};
use crate::context::{Fixtures, TestContext};
use crate::dsl::{HookFn, Suite, SuiteRegistry, TestCase};
use crate::error::{QcError, TestFailure};
use crate::governance::{rule_registry, GovernanceEngine};
use crate::hooks::HookKind;
use crate::interceptor::{HttpTransport, Interceptor};
use crate::issue::IssueLabels;
use crate::security::{check_registry, SecurityScanner};
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Test runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Stop after the first failing test
    pub bail: bool,
    /// Timeout for tests without their own, and for suite-level hooks (ms)
    pub default_timeout: u64,
    /// Retries for tests without their own
    pub default_retries: u32,
    /// Only run tests carrying at least one of these tags
    pub tags: Vec<String>,
    /// Only run tests whose name or `suite > name` contains this (case-insensitive)
    pub name_pattern: Option<String>,
    /// Only run top-level suites matching one of these
    pub suite_patterns: Vec<Regex>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            bail: false,
            default_timeout: DEFAULT_TIMEOUT_MS,
            default_retries: 0,
            tags: Vec::new(),
            name_pattern: None,
            suite_patterns: Vec::new(),
        }
    }
}

impl RunnerConfig {
    /// Runner settings carried by a run configuration
    pub fn from_run_config(config: &RunConfig) -> Result<Self, QcError> {
        Ok(Self {
            bail: config.bail,
            default_timeout: config.timeout,
            default_retries: config.retries,
            suite_patterns: config.suite_patterns()?,
            ..Default::default()
        })
    }

    pub fn with_bail(mut self, bail: bool) -> Self {
        self.bail = bail;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }

    fn matches_suite(&self, name: &str) -> bool {
        self.suite_patterns.is_empty() || self.suite_patterns.iter().any(|p| p.is_match(name))
    }

    fn matches_filters(&self, test: &TestCase, suite: &str) -> bool {
        if !self.tags.is_empty() && !self.tags.iter().any(|t| test.options.has_tag(t)) {
            return false;
        }

        if let Some(pattern) = &self.name_pattern {
            let pattern = pattern.to_lowercase();
            let full_name = format!("{} > {}", suite, test.name).to_lowercase();
            if !full_name.contains(&pattern) {
                return false;
            }
        }

        true
    }
}

/// Runs a [`SuiteRegistry`] and fills a [`ResultCollector`]
pub struct TestRunner {
    config: RunnerConfig,
    transport: Arc<dyn HttpTransport>,
    governance: Arc<GovernanceEngine>,
    security: Arc<SecurityScanner>,
    base_url: Option<String>,
    collector: ResultCollector,
}

impl TestRunner {
    /// Runner with no rules or checks loaded
    pub fn new(config: RunnerConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            governance: Arc::new(GovernanceEngine::new()),
            security: Arc::new(SecurityScanner::new()),
            base_url: None,
            collector: ResultCollector::new(),
        }
    }

    /// Runner, engines and base URL from a run configuration, using the
    /// process-wide rule and check registries
    pub fn from_run_config(
        config: &RunConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, QcError> {
        config.validate()?;
        let governance = GovernanceEngine::from_config(&config.governance, rule_registry())?;
        let security = SecurityScanner::from_config(&config.security, check_registry())?;

        let mut runner = Self::new(RunnerConfig::from_run_config(config)?, transport)
            .with_governance(governance)
            .with_security(security);
        runner.base_url = config.base_url.clone();
        Ok(runner)
    }

    pub fn with_governance(mut self, governance: GovernanceEngine) -> Self {
        self.governance = Arc::new(governance);
        self
    }

    pub fn with_security(mut self, security: SecurityScanner) -> Self {
        self.security = Arc::new(security);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RunnerConfig {
        &mut self.config
    }

    /// Collector this runner records into
    pub fn collector(&self) -> &ResultCollector {
        &self.collector
    }

    /// Run every selected suite and return the collected results
    pub async fn run(&self, registry: &SuiteRegistry) -> RunResults {
        let run = Run {
            runner: self,
            interceptor: Arc::new(Interceptor::new(
                self.transport.clone(),
                self.governance.clone(),
                self.security.clone(),
                self.collector.clone(),
                self.base_url.clone(),
            )),
            any_only: registry.has_only(),
            bailed: AtomicBool::new(false),
        };

        self.collector.start();
        info!(
            suites = registry.suites().len(),
            tests = registry.test_count(),
            "starting test run"
        );

        for suite in registry.suites() {
            if run.bailed() {
                break;
            }
            if !self.config.matches_suite(&suite.name) {
                debug!(suite = %suite.name, "suite does not match testMatch; not run");
                continue;
            }
            run.run_suite(suite, suite.name.clone(), Scope::default()).await;
        }

        self.collector.finish();
        let summary = self.collector.summary();
        info!(
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = summary.duration,
            "test run complete"
        );
        self.collector.results()
    }
}

/// Hooks and fixtures inherited from enclosing suites
#[derive(Clone, Default)]
struct Scope {
    /// Outer-first
    before_each: Vec<HookFn>,
    /// Inner-first
    after_each: Vec<HookFn>,
    fixtures: Fixtures,
}

impl Scope {
    fn enter(&self, suite: &Suite) -> Scope {
        let mut before_each = self.before_each.clone();
        before_each.extend(suite.hooks.before_each.iter().cloned());
        let mut after_each: Vec<HookFn> = suite.hooks.after_each.clone();
        after_each.extend(self.after_each.iter().cloned());
        Scope {
            before_each,
            after_each,
            fixtures: self.fixtures.clone(),
        }
    }
}

struct TestOutcome {
    result: TestResult,
    hook_failure: Option<(HookKind, String)>,
}

/// State of one `TestRunner::run` call
struct Run<'r> {
    runner: &'r TestRunner,
    interceptor: Arc<Interceptor>,
    any_only: bool,
    bailed: AtomicBool,
}

impl<'r> Run<'r> {
    fn collector(&self) -> &ResultCollector {
        &self.runner.collector
    }

    fn bailed(&self) -> bool {
        self.bailed.load(Ordering::SeqCst)
    }

    /// Whether a test is selected: skip beats only, only beats filters
    fn selected(&self, test: &TestCase, suite: &str) -> bool {
        if test.options.skip {
            return false;
        }
        if self.any_only && !test.options.only {
            return false;
        }
        self.runner.config.matches_filters(test, suite)
    }

    fn has_selected(&self, suite: &Suite, name: &str) -> bool {
        suite.tests.iter().any(|t| self.selected(t, name))
            || suite
                .children
                .iter()
                .any(|c| self.has_selected(c, &child_name(name, c)))
    }

    /// Record tests that will not run: unselected ones as skipped, selected
    /// ones as failed with `failure` (or skipped when there is none).
    ///
    /// Returns true when at least one test was recorded as failed.
    fn record_unreached(
        &self,
        tests: &[TestCase],
        children: &[Suite],
        name: &str,
        failure: Option<&TestFailure>,
    ) -> bool {
        self.collector().begin_suite(name);
        let mut any_failed = false;
        for test in tests {
            let result = match failure {
                Some(f) if self.selected(test, name) => {
                    any_failed = true;
                    TestResult::failed(name, &test.name, 0, f).with_attempts(0)
                }
                _ => TestResult::skipped(name, &test.name),
            };
            self.collector()
                .record_test(result.with_tags(test.options.tags.clone()));
        }
        for child in children {
            any_failed |=
                self.record_unreached(&child.tests, &child.children, &child_name(name, child), failure);
        }
        any_failed
    }

    /// Stop the run after a recorded failure when bail is on
    fn bail_if_enabled(&self, suite: &str, test: &str) -> bool {
        if !self.runner.config.bail {
            return false;
        }
        warn!(suite = %suite, test = %test, "bailing after first failure");
        self.bailed.store(true, Ordering::SeqCst);
        true
    }

    fn run_suite<'a>(&'a self, suite: &'a Suite, name: String, parent: Scope) -> BoxFuture<'a, ()> {
        async move {
            if !self.has_selected(suite, &name) {
                self.record_unreached(&suite.tests, &suite.children, &name, None);
                return;
            }

            self.collector().begin_suite(&name);
            debug!(suite = %name, "entering suite");
            let suite_timeout = self.runner.config.default_timeout;

            let ctx = self.context(&name, HookKind::BeforeAll.to_string(), parent.fixtures.clone(), 1);
            let mut aborted = None;
            for hook in suite.hooks.get(HookKind::BeforeAll) {
                if let Err(failure) = run_guarded(hook(ctx.clone()), suite_timeout).await {
                    let failure = failure.into_hook(HookKind::BeforeAll);
                    self.hook_failed(&name, HookKind::BeforeAll, &failure);
                    aborted = Some(failure);
                    break;
                }
            }

            let mut scope = parent.enter(suite);
            scope.fixtures = ctx.fixtures();

            if let Some(failure) = &aborted {
                if self.record_unreached(&suite.tests, &suite.children, &name, Some(failure)) {
                    self.bail_if_enabled(&name, HookKind::BeforeAll.as_str());
                }
            } else {
                self.run_tests_and_children(suite, &name, &scope).await;
            }

            // afterAll runs even after a bail
            let ctx = self.context(&name, HookKind::AfterAll.to_string(), scope.fixtures.clone(), 1);
            for hook in suite.hooks.get(HookKind::AfterAll) {
                if let Err(failure) = run_guarded(hook(ctx.clone()), suite_timeout).await {
                    let failure = failure.into_hook(HookKind::AfterAll);
                    self.hook_failed(&name, HookKind::AfterAll, &failure);
                }
            }
        }
        .boxed()
    }

    async fn run_tests_and_children(&self, suite: &Suite, name: &str, scope: &Scope) {
        for (i, test) in suite.tests.iter().enumerate() {
            if self.bailed() {
                return;
            }
            if !self.selected(test, name) {
                self.collector().record_test(
                    TestResult::skipped(name, &test.name).with_tags(test.options.tags.clone()),
                );
                continue;
            }

            let outcome = self.run_test(test, name, scope).await;
            let failed = outcome.result.is_failed();
            self.collector().record_test(outcome.result);

            if failed && self.bail_if_enabled(name, &test.name) {
                return;
            }

            if let Some((hook, message)) = outcome.hook_failure {
                let failure = TestFailure::Hook { hook, message };
                if self.record_unreached(&suite.tests[i + 1..], &suite.children, name, Some(&failure)) {
                    self.bail_if_enabled(name, hook.as_str());
                }
                return;
            }
        }

        for child in &suite.children {
            if self.bailed() {
                return;
            }
            self.run_suite(child, child_name(name, child), scope.clone()).await;
        }
    }

    async fn run_test(&self, test: &TestCase, suite: &str, scope: &Scope) -> TestOutcome {
        let config = &self.runner.config;
        let timeout = test.options.timeout.unwrap_or(config.default_timeout);
        let retries = test.options.retry.unwrap_or(config.default_retries);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(suite = %suite, test = %test.name, attempt, "running test");

            let ctx = self.context(suite, test.name.clone(), scope.fixtures.clone(), attempt);
            let start = Instant::now();
            let mut failure: Option<TestFailure> = None;
            let mut hook_failure = None;

            for hook in &scope.before_each {
                if let Err(f) = run_guarded(hook(ctx.clone()), timeout).await {
                    let f = f.into_hook(HookKind::BeforeEach);
                    self.hook_failed(suite, HookKind::BeforeEach, &f);
                    hook_failure = Some((HookKind::BeforeEach, f.to_string()));
                    failure = Some(f);
                    break;
                }
            }

            if failure.is_none() {
                if let Err(f) = run_guarded((test.func)(ctx.clone()), timeout).await {
                    failure = Some(f);
                }
            }

            for hook in &scope.after_each {
                if let Err(f) = run_guarded(hook(ctx.clone()), timeout).await {
                    let f = f.into_hook(HookKind::AfterEach);
                    self.hook_failed(suite, HookKind::AfterEach, &f);
                    if hook_failure.is_none() {
                        hook_failure = Some((HookKind::AfterEach, f.to_string()));
                    }
                    if failure.is_none() {
                        failure = Some(f);
                    }
                }
            }

            let duration = start.elapsed().as_millis() as u64;
            let result = match failure {
                None => TestResult::passed(suite, &test.name, duration),
                Some(f)
                    if hook_failure.is_none()
                        && f.is_retryable(test.options.retry_on_timeout)
                        && attempt <= retries =>
                {
                    warn!(
                        suite = %suite,
                        test = %test.name,
                        attempt,
                        error = %f,
                        "test failed; retrying"
                    );
                    continue;
                }
                Some(f) => TestResult::failed(suite, &test.name, duration, &f),
            };

            debug!(suite = %suite, test = %test.name, status = %result.status, duration, "test finished");
            return TestOutcome {
                result: result
                    .with_attempts(attempt)
                    .with_tags(test.options.tags.clone()),
                hook_failure,
            };
        }
    }

    fn context(&self, suite: &str, test: String, fixtures: Fixtures, attempt: u32) -> TestContext {
        TestContext::new(
            self.interceptor.clone(),
            IssueLabels::new(suite, test),
            fixtures,
            attempt,
        )
    }

    fn hook_failed(&self, suite: &str, hook: HookKind, failure: &TestFailure) {
        let message = match failure {
            TestFailure::Hook { message, .. } => message.clone(),
            other => other.to_string(),
        };
        error!(suite = %suite, hook = %hook, error = %message, "hook failed");
        self.collector().record_hook_error(suite, hook, message);
    }
}

fn child_name(parent: &str, child: &Suite) -> String {
    format!("{} > {}", parent, child.name)
}

/// Run a body or hook on its own task, racing it against `timeout_ms`.
///
/// On timeout the task is aborted; a body that never yields may keep running
/// in the background but its outcome is ignored.
async fn run_guarded(
    body: BoxFuture<'static, anyhow::Result<()>>,
    timeout_ms: u64,
) -> Result<(), TestFailure> {
    let mut handle = tokio::spawn(body);
    match tokio::time::timeout(Duration::from_millis(timeout_ms), &mut handle).await {
        Err(_) => {
            handle.abort();
            Err(TestFailure::Timeout(timeout_ms))
        }
        Ok(Err(join_error)) if join_error.is_panic() => {
            Err(TestFailure::Panic(panic_message(join_error.into_panic())))
        }
        Ok(Err(join_error)) => Err(TestFailure::Error(join_error.to_string())),
        Ok(Ok(Err(e))) => Err(TestFailure::from_error(e)),
        Ok(Ok(Ok(()))) => Ok(()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
