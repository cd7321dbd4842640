//! Result collection
//!
//! The [`ResultCollector`] is the single source of truth for a run: test
//! outcomes, hook errors, governance violations and security findings are
//! appended to it as they are produced, and [`ResultCollector::results`]
//! snapshots everything into a [`RunResults`] for reporters and the gate.

use crate::error::{FailureKind, TestFailure};
use crate::governance::Violation;
use crate::hooks::HookKind;
use crate::security::Finding;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Test execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "PASSED"),
            TestStatus::Failed => write!(f, "FAILED"),
            TestStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Outcome of one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    /// Qualified suite name (`Parent > Child`)
    pub suite: String,
    pub status: TestStatus,
    /// Duration of the recorded attempt in milliseconds
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Attempts made, including the recorded one; 0 when skipped
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl TestResult {
    pub fn passed(suite: impl Into<String>, name: impl Into<String>, duration: u64) -> Self {
        Self {
            name: name.into(),
            suite: suite.into(),
            status: TestStatus::Passed,
            duration,
            error: None,
            failure_kind: None,
            attempts: 1,
            tags: Vec::new(),
        }
    }

    pub fn failed(
        suite: impl Into<String>,
        name: impl Into<String>,
        duration: u64,
        failure: &TestFailure,
    ) -> Self {
        Self {
            name: name.into(),
            suite: suite.into(),
            status: TestStatus::Failed,
            duration,
            error: Some(failure.to_string()),
            failure_kind: Some(failure.kind()),
            attempts: 1,
            tags: Vec::new(),
        }
    }

    pub fn skipped(suite: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suite: suite.into(),
            status: TestStatus::Skipped,
            duration: 0,
            error: None,
            failure_kind: None,
            attempts: 0,
            tags: Vec::new(),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn is_passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    pub fn is_failed(&self) -> bool {
        self.status == TestStatus::Failed
    }
}

/// A hook that threw, attributed to its suite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookError {
    pub hook: HookKind,
    pub message: String,
}

/// Per-suite detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteResult {
    pub name: String,
    pub tests: Vec<TestResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hook_errors: Vec<HookError>,
}

/// Summary of test results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Milliseconds
    pub duration: u64,
}

impl TestSummary {
    /// `passed / (total - skipped) * 100`; 100 when nothing ran
    pub fn success_rate(&self) -> f64 {
        let ran = self.total - self.skipped;
        if ran == 0 {
            return 100.0;
        }
        self.passed as f64 / ran as f64 * 100.0
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceResults {
    pub violations: Vec<Violation>,
    pub warnings: Vec<Violation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityResults {
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    pub branch: String,
    pub commit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_info: Option<GitInfo>,
}

/// Snapshot of a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    pub suites: Vec<SuiteResult>,
    pub summary: TestSummary,
    pub governance: GovernanceResults,
    pub security: SecurityResults,
    pub metadata: RunMetadata,
}

impl RunResults {
    /// `passed / (total - skipped) * 100`; 100 when nothing ran
    pub fn success_rate(&self) -> f64 {
        self.summary.success_rate()
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    /// Every hook error with its suite name
    pub fn hook_errors(&self) -> impl Iterator<Item = (&str, &HookError)> {
        self.suites
            .iter()
            .flat_map(|s| s.hook_errors.iter().map(move |e| (s.name.as_str(), e)))
    }

    /// All test results in recording order
    pub fn tests(&self) -> impl Iterator<Item = &TestResult> {
        self.suites.iter().flat_map(|s| s.tests.iter())
    }
}

#[derive(Default)]
struct State {
    suites: Vec<SuiteResult>,
    violations: Vec<Violation>,
    warnings: Vec<Violation>,
    findings: Vec<Finding>,
    started: Option<(DateTime<Utc>, Instant)>,
    finished: Option<(DateTime<Utc>, u64)>,
    git_info: Option<GitInfo>,
}

impl State {
    fn suite_mut(&mut self, name: &str) -> &mut SuiteResult {
        match self.suites.iter().position(|s| s.name == name) {
            Some(i) => &mut self.suites[i],
            None => {
                self.suites.push(SuiteResult {
                    name: name.to_string(),
                    tests: Vec::new(),
                    hook_errors: Vec::new(),
                });
                let last = self.suites.len() - 1;
                &mut self.suites[last]
            }
        }
    }

    fn summary(&self) -> TestSummary {
        let mut summary = TestSummary::default();
        let mut test_time = 0;
        for result in self.suites.iter().flat_map(|s| s.tests.iter()) {
            summary.total += 1;
            match result.status {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::Skipped => summary.skipped += 1,
            }
            test_time += result.duration;
        }
        summary.duration = self.finished.map(|(_, wall)| wall).unwrap_or(test_time);
        summary
    }
}

/// Append-only store shared by the runner and every test's request client
#[derive(Clone, Default)]
pub struct ResultCollector {
    state: Arc<Mutex<State>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of the run
    pub fn start(&self) {
        self.state.lock().started = Some((Utc::now(), Instant::now()));
    }

    /// Mark the end of the run; the summary duration becomes wall-clock time
    pub fn finish(&self) {
        let mut state = self.state.lock();
        let wall = state
            .started
            .map(|(_, at)| at.elapsed().as_millis() as u64)
            .unwrap_or(0);
        state.finished = Some((Utc::now(), wall));
    }

    /// Make sure a suite shows up in the results even if it records nothing
    pub fn begin_suite(&self, suite: &str) {
        self.state.lock().suite_mut(suite);
    }

    pub fn record_test(&self, result: TestResult) {
        let mut state = self.state.lock();
        let suite = result.suite.clone();
        state.suite_mut(&suite).tests.push(result);
    }

    pub fn record_hook_error(&self, suite: &str, hook: HookKind, message: impl Into<String>) {
        self.state.lock().suite_mut(suite).hook_errors.push(HookError {
            hook,
            message: message.into(),
        });
    }

    /// Append violations; low/info severities are filed as warnings
    pub fn add_violations(&self, violations: Vec<Violation>) {
        if violations.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        for violation in violations {
            if violation.severity.is_warning() {
                state.warnings.push(violation);
            } else {
                state.violations.push(violation);
            }
        }
    }

    pub fn add_findings(&self, findings: Vec<Finding>) {
        if findings.is_empty() {
            return;
        }
        self.state.lock().findings.extend(findings);
    }

    pub fn set_git_info(&self, git_info: GitInfo) {
        self.state.lock().git_info = Some(git_info);
    }

    pub fn summary(&self) -> TestSummary {
        self.state.lock().summary()
    }

    pub fn success_rate(&self) -> f64 {
        self.summary().success_rate()
    }

    pub fn has_failures(&self) -> bool {
        self.summary().failed > 0
    }

    /// Read-only snapshot of everything collected so far
    pub fn results(&self) -> RunResults {
        let state = self.state.lock();
        RunResults {
            suites: state.suites.clone(),
            summary: state.summary(),
            governance: GovernanceResults {
                violations: state.violations.clone(),
                warnings: state.warnings.clone(),
            },
            security: SecurityResults {
                findings: state.findings.clone(),
            },
            metadata: RunMetadata {
                start_time: state.started.map(|(at, _)| at),
                end_time: state.finished.map(|(at, _)| at),
                git_info: state.git_info.clone(),
            },
        }
    }
}

impl std::fmt::Debug for ResultCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCollector")
            .field("summary", &self.summary())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::Severity;

    fn violation(severity: Severity) -> Violation {
        Violation {
            rule: "versioning".into(),
            category: "versioning".into(),
            severity,
            message: "m".into(),
            title: "t".into(),
            endpoint: "/user".into(),
            method: "GET".into(),
            location: "path".into(),
            remediation: "r".into(),
            suite: "Users".into(),
            test: "get".into(),
            evidence: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let collector = ResultCollector::new();
        collector.record_test(TestResult::passed("A", "one", 10));
        collector.record_test(TestResult::passed("A", "two", 20));
        collector.record_test(TestResult::failed(
            "B",
            "three",
            30,
            &TestFailure::Assertion("nope".into()),
        ));
        collector.record_test(TestResult::skipped("B", "four"));

        let summary = collector.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.total, summary.passed + summary.failed + summary.skipped);
        assert_eq!(summary.duration, 60);
        assert!(collector.has_failures());
        assert!((collector.success_rate() - 200.0 / 3.0).abs() < 1e-9);

        let results = collector.results();
        assert_eq!(results.suites.len(), 2);
        assert_eq!(results.suites[1].tests[0].failure_kind, Some(FailureKind::Assertion));
    }

    #[test]
    fn test_success_rate_without_runnable_tests() {
        let collector = ResultCollector::new();
        assert_eq!(collector.success_rate(), 100.0);
        collector.record_test(TestResult::skipped("A", "skipped"));
        assert_eq!(collector.success_rate(), 100.0);
        assert!(!collector.has_failures());
    }

    #[test]
    fn test_violations_are_split_by_severity() {
        let collector = ResultCollector::new();
        collector.add_violations(vec![
            violation(Severity::High),
            violation(Severity::Low),
            violation(Severity::Info),
        ]);
        let results = collector.results();
        assert_eq!(results.governance.violations.len(), 1);
        assert_eq!(results.governance.warnings.len(), 2);
    }

    #[test]
    fn test_results_are_idempotent() {
        let collector = ResultCollector::new();
        collector.start();
        collector.record_test(TestResult::passed("A", "one", 5));
        collector.record_hook_error("A", HookKind::AfterAll, "cleanup failed");
        collector.finish();

        let first = serde_json::to_value(collector.results()).unwrap();
        let second = serde_json::to_value(collector.results()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first["suites"][0]["hookErrors"][0]["hook"], "afterAll");
        assert!(first["metadata"]["startTime"].is_string());
    }

    #[test]
    fn test_results_round_trip_through_json() {
        let collector = ResultCollector::new();
        collector.record_test(TestResult::passed("A", "one", 5).with_tags(vec!["smoke".into()]));
        let results = collector.results();
        let json = serde_json::to_string(&results).unwrap();
        let back: RunResults = serde_json::from_str(&json).unwrap();
        assert_eq!(back, results);
    }
}
