//! apiguard-qc: API test orchestration with governance and security checks
//!
//! Suites are declared with a small DSL, executed with lifecycle hooks,
//! timeouts and retries, and every HTTP exchange a test makes is run through
//! a set of pluggable governance rules (API design) and security checks.
//! Everything lands in one [`ResultCollector`] that reporters and the
//! threshold gate consume.
//!
//! # Example
//!
//! ```ignore
//! use apiguard_qc::{expect, RunConfig, SuiteRegistry, TestRunner};
//!
//! let mut registry = SuiteRegistry::new();
//! registry.describe("Users API", |s| {
//!     s.test("lists users", |ctx| async move {
//!         let response = ctx.request().get("/v1/users").await?;
//!         expect(&response).to_have_status(200)?;
//!         Ok(())
//!     })
//! })?;
//!
//! let config = RunConfig::from_path("apiguard.config.yaml")?;
//! let runner = TestRunner::from_run_config(&config, transport)?;
//! let results = runner.run(&registry).await;
//! ```

pub mod assertions;
pub mod collector;
pub mod config;
pub mod context;
pub mod dsl;
pub mod error;
pub mod governance;
pub mod hooks;
pub mod interceptor;
pub mod issue;
pub mod registry;
pub mod reporter;
pub mod runner;
pub mod security;
pub mod test_server;

// Re-export main types
pub use assertions::{expect, json_path, AssertionError, AssertionResult, Expectation};
pub use collector::{
    GitInfo, GovernanceResults, HookError, ResultCollector, RunMetadata, RunResults,
    SecurityResults, SuiteResult, TestResult, TestStatus, TestSummary,
};
pub use config::{
    ConfigFormat, GovernanceConfig, GovernanceThresholds, PluginConfig, RunConfig,
    SecurityConfig, SecurityThresholds, Thresholds,
};
pub use context::{Fixtures, TestContext};
pub use dsl::{Suite, SuiteRegistry, TestCase, TestOptions};
pub use error::{ConfigError, DslError, EngineError, FailureKind, QcError, TestFailure};
pub use governance::{rule_registry, GovernanceEngine, GovernanceRule, RawViolation, Violation};
pub use hooks::HookKind;
pub use interceptor::{HttpTransport, Interceptor, RequestClient};
pub use issue::{Endpoint, Exchange, IssueLabels, Severity};
pub use registry::FactoryRegistry;
pub use reporter::{ReportFormat, Reporter};
pub use runner::{RunnerConfig, TestRunner};
pub use security::{check_registry, Finding, RawFinding, SecurityCheck, SecurityScanner};
pub use test_server::{StubRoute, TestServer, TestServerHandle};
