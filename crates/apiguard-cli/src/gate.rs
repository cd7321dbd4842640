//! Threshold gate - turns a run's results into a process outcome

use apiguard_qc::{RunResults, Severity, Thresholds};
use serde::Serialize;
use std::fmt;

/// One exceeded threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Breach {
    GovernanceViolations { count: usize, max: usize },
    GovernanceWarnings { count: usize, max: usize },
    SecurityFindings { severity: Severity, count: usize, max: usize },
    TestPassRate { rate: f64, min: f64 },
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Breach::GovernanceViolations { count, max } => {
                write!(f, "{} governance violation(s) exceed the limit of {}", count, max)
            }
            Breach::GovernanceWarnings { count, max } => {
                write!(f, "{} governance warning(s) exceed the limit of {}", count, max)
            }
            Breach::SecurityFindings { severity, count, max } => write!(
                f,
                "{} {} security finding(s) exceed the limit of {}",
                count, severity, max
            ),
            Breach::TestPassRate { rate, min } => {
                write!(f, "test pass rate {:.1}% is below the minimum of {:.1}%", rate, min)
            }
        }
    }
}

/// Result of gating one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateOutcome {
    pub failed_tests: usize,
    pub hook_errors: usize,
    pub breaches: Vec<Breach>,
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        self.failed_tests == 0 && self.hook_errors == 0 && self.breaches.is_empty()
    }

    /// 0 when the run passed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}

/// Applies configured caps to a run's results
#[derive(Debug, Clone, Default)]
pub struct ThresholdGate {
    thresholds: Thresholds,
}

impl ThresholdGate {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn evaluate(&self, results: &RunResults) -> GateOutcome {
        let mut breaches = Vec::new();
        let governance = &self.thresholds.governance_violations;

        if let Some(max) = governance.error {
            let count = results.governance.violations.len();
            if count > max {
                breaches.push(Breach::GovernanceViolations { count, max });
            }
        }
        if let Some(max) = governance.warning {
            let count = results.governance.warnings.len();
            if count > max {
                breaches.push(Breach::GovernanceWarnings { count, max });
            }
        }

        for severity in Severity::ALL {
            let Some(max) = self.thresholds.security_findings.cap(severity) else {
                continue;
            };
            let count = results
                .security
                .findings
                .iter()
                .filter(|f| f.severity == severity)
                .count();
            if count > max {
                breaches.push(Breach::SecurityFindings { severity, count, max });
            }
        }

        if let Some(min) = self.thresholds.test_pass_rate {
            let rate = results.success_rate();
            if rate < min {
                breaches.push(Breach::TestPassRate { rate, min });
            }
        }

        GateOutcome {
            failed_tests: results.summary.failed,
            hook_errors: results.hook_errors().count(),
            breaches,
        }
    }
}
