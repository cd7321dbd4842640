//! Test reporter - renders run results in various formats

use crate::collector::{RunResults, TestStatus};
use crate::issue::Severity;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as FmtWrite};

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// JSON format (machine-parseable, same shape as the results file)
    Json,
    /// Markdown format (human-readable)
    Markdown,
    /// JUnit XML format (CI integration)
    JUnit,
    /// Console format (colored terminal output)
    #[default]
    Console,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Json => write!(f, "json"),
            ReportFormat::Markdown => write!(f, "markdown"),
            ReportFormat::JUnit => write!(f, "junit"),
            ReportFormat::Console => write!(f, "console"),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "junit" | "xml" => Ok(ReportFormat::JUnit),
            "console" | "text" => Ok(ReportFormat::Console),
            other => Err(format!(
                "unknown report format '{}' (expected json, markdown, junit or console)",
                other
            )),
        }
    }
}

/// Test reporter - generates reports in various formats
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    format: ReportFormat,
}

impl Reporter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    pub fn json() -> Self {
        Self::new(ReportFormat::Json)
    }

    pub fn markdown() -> Self {
        Self::new(ReportFormat::Markdown)
    }

    pub fn junit() -> Self {
        Self::new(ReportFormat::JUnit)
    }

    pub fn console() -> Self {
        Self::new(ReportFormat::Console)
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }

    /// Generate report string
    pub fn generate(&self, results: &RunResults) -> String {
        if self.format == ReportFormat::Json {
            return serde_json::to_string_pretty(results).unwrap_or_else(|_| "{}".to_string());
        }

        let mut output = String::new();
        let rendered = match self.format {
            ReportFormat::Markdown => write_markdown(&mut output, results),
            ReportFormat::JUnit => write_junit(&mut output, results),
            _ => write_console(&mut output, results),
        };
        // Writing into a String cannot fail
        rendered.map(|_| output).unwrap_or_default()
    }
}

fn seconds(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

fn severity_counts<'a>(severities: impl Iterator<Item = &'a Severity>) -> Vec<(Severity, usize)> {
    let severities: Vec<_> = severities.collect();
    Severity::ALL
        .iter()
        .map(|s| (*s, severities.iter().filter(|x| **x == s).count()))
        .filter(|(_, n)| *n > 0)
        .collect()
}

fn write_markdown(out: &mut String, results: &RunResults) -> fmt::Result {
    let summary = &results.summary;
    let status = if results.has_failures() { "FAILED" } else { "PASSED" };

    writeln!(out, "# API Test Report")?;
    writeln!(out)?;
    writeln!(
        out,
        "**Status**: {} ({}/{}) | **Duration**: {:.2}s | **Success rate**: {:.1}%",
        status,
        summary.passed,
        summary.total,
        seconds(summary.duration),
        results.success_rate()
    )?;
    if let Some(git) = &results.metadata.git_info {
        writeln!(out)?;
        writeln!(out, "**Branch**: `{}` | **Commit**: `{}`", git.branch, git.commit)?;
    }
    writeln!(out)?;

    writeln!(out, "## Summary")?;
    writeln!(out)?;
    writeln!(out, "| Suite | Passed | Failed | Skipped | Duration |")?;
    writeln!(out, "|-------|--------|--------|---------|----------|")?;
    for suite in &results.suites {
        let count = |status: TestStatus| suite.tests.iter().filter(|t| t.status == status).count();
        let duration: u64 = suite.tests.iter().map(|t| t.duration).sum();
        writeln!(
            out,
            "| {} | {} | {} | {} | {:.2}s |",
            suite.name,
            count(TestStatus::Passed),
            count(TestStatus::Failed),
            count(TestStatus::Skipped),
            seconds(duration)
        )?;
    }
    writeln!(out)?;

    let failed: Vec<_> = results.tests().filter(|t| t.is_failed()).collect();
    if !failed.is_empty() {
        writeln!(out, "## Failed Tests")?;
        writeln!(out)?;
        for test in failed {
            writeln!(out, "### {} > {}", test.suite, test.name)?;
            writeln!(out)?;
            if let Some(error) = &test.error {
                writeln!(out, "**Error**: {}", error)?;
            }
            if test.attempts > 1 {
                writeln!(out, "**Attempts**: {}", test.attempts)?;
            }
            writeln!(out)?;
        }
    }

    let hook_errors: Vec<_> = results.hook_errors().collect();
    if !hook_errors.is_empty() {
        writeln!(out, "## Hook Errors")?;
        writeln!(out)?;
        for (suite, error) in hook_errors {
            writeln!(out, "- **{}** `{}`: {}", suite, error.hook, error.message)?;
        }
        writeln!(out)?;
    }

    let governance = &results.governance;
    if !governance.violations.is_empty() || !governance.warnings.is_empty() {
        writeln!(out, "## Governance")?;
        writeln!(out)?;
        writeln!(
            out,
            "{} violation(s), {} warning(s)",
            governance.violations.len(),
            governance.warnings.len()
        )?;
        writeln!(out)?;
        writeln!(out, "| Severity | Rule | Endpoint | Message | Test |")?;
        writeln!(out, "|----------|------|----------|---------|------|")?;
        for v in governance.violations.iter().chain(&governance.warnings) {
            writeln!(
                out,
                "| {} | {} | {} {} | {} | {} > {} |",
                v.severity, v.rule, v.method, v.endpoint, v.message, v.suite, v.test
            )?;
        }
        writeln!(out)?;
    }

    let findings = &results.security.findings;
    if !findings.is_empty() {
        writeln!(out, "## Security")?;
        writeln!(out)?;
        let counts: Vec<String> = severity_counts(findings.iter().map(|f| &f.severity))
            .into_iter()
            .map(|(s, n)| format!("{} {}", n, s))
            .collect();
        writeln!(out, "{} finding(s): {}", findings.len(), counts.join(", "))?;
        writeln!(out)?;
        writeln!(out, "| Severity | Check | Title | CWE | Endpoint | Test |")?;
        writeln!(out, "|----------|-------|-------|-----|----------|------|")?;
        for f in findings {
            writeln!(
                out,
                "| {} | {} | {} | {} | {} {} | {} > {} |",
                f.severity, f.check, f.title, f.cwe, f.method, f.endpoint, f.suite, f.test
            )?;
        }
        writeln!(out)?;
    }

    Ok(())
}

fn write_junit(out: &mut String, results: &RunResults) -> fmt::Result {
    let summary = &results.summary;
    let timestamp = results
        .metadata
        .start_time
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();

    writeln!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
    writeln!(
        out,
        "<testsuites name=\"apiguard\" tests=\"{}\" failures=\"{}\" skipped=\"{}\" time=\"{:.3}\">",
        summary.total,
        summary.failed,
        summary.skipped,
        seconds(summary.duration)
    )?;

    for suite in &results.suites {
        let failures = suite.tests.iter().filter(|t| t.is_failed()).count();
        let skipped = suite
            .tests
            .iter()
            .filter(|t| t.status == TestStatus::Skipped)
            .count();
        let time: u64 = suite.tests.iter().map(|t| t.duration).sum();
        writeln!(
            out,
            "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{:.3}\" timestamp=\"{}\">",
            escape_xml(&suite.name),
            suite.tests.len(),
            failures,
            suite.hook_errors.len(),
            skipped,
            seconds(time),
            timestamp
        )?;

        for test in &suite.tests {
            writeln!(
                out,
                "    <testcase name=\"{}\" classname=\"{}\" time=\"{:.3}\">",
                escape_xml(&test.name),
                escape_xml(&test.suite),
                seconds(test.duration)
            )?;
            match test.status {
                TestStatus::Failed => {
                    let message = test.error.as_deref().unwrap_or("Test failed");
                    let kind = test
                        .failure_kind
                        .map(|k| k.to_string())
                        .unwrap_or_else(|| "error".to_string());
                    writeln!(
                        out,
                        "      <failure type=\"{}\" message=\"{}\" />",
                        kind,
                        escape_xml(message)
                    )?;
                }
                TestStatus::Skipped => writeln!(out, "      <skipped />")?,
                TestStatus::Passed => {}
            }
            writeln!(out, "    </testcase>")?;
        }

        for error in &suite.hook_errors {
            writeln!(
                out,
                "    <error type=\"{}\" message=\"{}\" />",
                error.hook,
                escape_xml(&error.message)
            )?;
        }
        writeln!(out, "  </testsuite>")?;
    }

    writeln!(out, "</testsuites>")
}

fn write_console(out: &mut String, results: &RunResults) -> fmt::Result {
    const RESET: &str = "\x1b[0m";
    const BOLD: &str = "\x1b[1m";
    const GREEN: &str = "\x1b[32m";
    const RED: &str = "\x1b[31m";
    const YELLOW: &str = "\x1b[33m";
    const CYAN: &str = "\x1b[36m";
    const DIM: &str = "\x1b[2m";

    let summary = &results.summary;

    for suite in &results.suites {
        if suite.tests.is_empty() && suite.hook_errors.is_empty() {
            continue;
        }
        writeln!(out, "{}{}{}", BOLD, suite.name, RESET)?;
        for test in &suite.tests {
            match test.status {
                TestStatus::Passed => writeln!(
                    out,
                    "  {}✓{} {} {}({}ms){}",
                    GREEN, RESET, test.name, DIM, test.duration, RESET
                )?,
                TestStatus::Failed => {
                    writeln!(out, "  {}✗ {}{}", RED, test.name, RESET)?;
                    if let Some(error) = &test.error {
                        writeln!(out, "      {}{}{}", DIM, error, RESET)?;
                    }
                }
                TestStatus::Skipped => {
                    writeln!(out, "  {}○ {} (skipped){}", YELLOW, test.name, RESET)?
                }
            }
        }
        for error in &suite.hook_errors {
            writeln!(out, "  {}! {} hook: {}{}", RED, error.hook, error.message, RESET)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "{}{}Summary:{}", BOLD, CYAN, RESET)?;
    writeln!(
        out,
        "  {}{} passed{}  {}{} failed{}  {}{} skipped{}  ({} total, {:.2}s, {:.1}%)",
        GREEN,
        summary.passed,
        RESET,
        RED,
        summary.failed,
        RESET,
        YELLOW,
        summary.skipped,
        RESET,
        summary.total,
        seconds(summary.duration),
        results.success_rate()
    )?;

    let governance = &results.governance;
    writeln!(
        out,
        "  Governance: {} violation(s), {} warning(s)",
        governance.violations.len(),
        governance.warnings.len()
    )?;

    let findings = &results.security.findings;
    let counts: Vec<String> = severity_counts(findings.iter().map(|f| &f.severity))
        .into_iter()
        .map(|(s, n)| format!("{} {}", n, s))
        .collect();
    if counts.is_empty() {
        writeln!(out, "  Security: no findings")?;
    } else {
        writeln!(out, "  Security: {}", counts.join(", "))?;
    }

    Ok(())
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{ResultCollector, TestResult};
    use crate::error::TestFailure;
    use crate::hooks::HookKind;

    fn sample() -> RunResults {
        let collector = ResultCollector::new();
        collector.record_test(TestResult::passed("Users", "lists users", 12));
        collector.record_test(TestResult::failed(
            "Users",
            "rejects <bad> input",
            30,
            &TestFailure::Assertion("Expected 400 to be 422".into()),
        ));
        collector.record_test(TestResult::skipped("Orders", "pending"));
        collector.record_hook_error("Orders", HookKind::AfterAll, "cleanup failed");
        collector.results()
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<ReportFormat>(), Ok(ReportFormat::Json));
        assert_eq!("md".parse::<ReportFormat>(), Ok(ReportFormat::Markdown));
        assert_eq!("junit".parse::<ReportFormat>(), Ok(ReportFormat::JUnit));
        assert!("html".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_json_report_matches_results_shape() {
        let results = sample();
        let json: serde_json::Value =
            serde_json::from_str(&Reporter::json().generate(&results)).unwrap();
        assert_eq!(json["summary"]["total"], 3);
        assert_eq!(json["suites"][0]["tests"][1]["status"], "failed");
        assert!(json["governance"]["violations"].is_array());
        assert!(json["security"]["findings"].is_array());
    }

    #[test]
    fn test_markdown_report() {
        let report = Reporter::markdown().generate(&sample());
        assert!(report.contains("# API Test Report"));
        assert!(report.contains("**Status**: FAILED (1/3)"));
        assert!(report.contains("| Users | 1 | 1 | 0 |"));
        assert!(report.contains("### Users > rejects <bad> input"));
        assert!(report.contains("**Orders** `afterAll`: cleanup failed"));
    }

    #[test]
    fn test_junit_report() {
        let report = Reporter::junit().generate(&sample());
        assert!(report.starts_with("<?xml"));
        assert!(report.contains("tests=\"3\" failures=\"1\" skipped=\"1\""));
        assert!(report.contains("name=\"rejects &lt;bad&gt; input\""));
        assert!(report.contains("<failure type=\"assertion\" message=\"Expected 400 to be 422\" />"));
        assert!(report.contains("<error type=\"afterAll\" message=\"cleanup failed\" />"));
    }

    #[test]
    fn test_console_report() {
        let report = Reporter::console().generate(&sample());
        assert!(report.contains("lists users"));
        assert!(report.contains("pending (skipped)"));
        assert!(report.contains("Security: no findings"));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("<a & 'b'>"), "&lt;a &amp; &apos;b&apos;&gt;");
    }
}
