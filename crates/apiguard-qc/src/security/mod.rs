//! Security scanning of observed exchanges
//!
//! Mirrors the governance engine: a [`SecurityScanner`] runs every loaded
//! [`SecurityCheck`] against an exchange, contains check failures, and
//! normalizes [`RawFinding`]s into [`Finding`]s with a title, CWE and
//! suite/test attribution.

pub mod checks;
pub mod cwe;

use crate::config::SecurityConfig;
use crate::error::EngineError;
use crate::issue::{title_case, Exchange, IssueLabels, Severity};
use crate::registry::FactoryRegistry;
use async_trait::async_trait;
use futures::FutureExt;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Security check contract
#[async_trait]
pub trait SecurityCheck: Send + Sync {
    /// Check name (matches its config key)
    fn name(&self) -> &str;

    /// Inspect one exchange; an empty list means "no issues"
    async fn execute(&self, exchange: &Exchange<'_>) -> anyhow::Result<Vec<RawFinding>>;
}

/// A finding as emitted by a check; any field may be left out
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFinding {
    #[serde(rename = "type")]
    pub finding_type: Option<String>,
    pub severity: Option<Severity>,
    pub description: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub remediation: Option<String>,
    pub evidence: Option<JsonValue>,
    pub cwe: Option<String>,
}

impl RawFinding {
    pub fn new(finding_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            finding_type: Some(finding_type.into()),
            description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn evidence(mut self, evidence: JsonValue) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

/// Normalized security finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub check: String,
    #[serde(rename = "type")]
    pub finding_type: String,
    pub severity: Severity,
    pub description: String,
    pub title: String,
    pub endpoint: String,
    pub method: String,
    pub location: String,
    pub remediation: String,
    pub suite: String,
    pub test: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<JsonValue>,
    pub cwe: String,
}

struct LoadedCheck {
    name: String,
    severity: Option<Severity>,
    check: Arc<dyn SecurityCheck>,
}

/// Runs every loaded check against an exchange
#[derive(Default)]
pub struct SecurityScanner {
    checks: Vec<LoadedCheck>,
}

impl SecurityScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every enabled check named in `config`, in name order
    pub fn from_config(
        config: &SecurityConfig,
        registry: &FactoryRegistry<dyn SecurityCheck>,
    ) -> Result<Self, EngineError> {
        let mut scanner = Self::new();
        if !config.enabled {
            return Ok(scanner);
        }

        for (name, check_config) in config.checks.iter().filter(|(_, c)| c.enabled) {
            let check = match registry.create(name, check_config) {
                None => return Err(EngineError::UnknownCheck(name.clone())),
                Some(Err(e)) => {
                    return Err(EngineError::Factory {
                        name: name.clone(),
                        message: e.to_string(),
                    })
                }
                Some(Ok(check)) => check,
            };
            scanner.checks.push(LoadedCheck {
                name: name.clone(),
                severity: check_config.severity,
                check,
            });
        }

        debug!(checks = ?scanner.check_names(), "security checks loaded");
        Ok(scanner)
    }

    /// Register an ad-hoc check after the configured ones
    pub fn add_check(&mut self, check: Arc<dyn SecurityCheck>) -> &mut Self {
        self.checks.push(LoadedCheck {
            name: check.name().to_string(),
            severity: None,
            check,
        });
        self
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run all checks, in order, against one exchange
    pub async fn scan(&self, exchange: &Exchange<'_>, labels: &IssueLabels) -> Vec<Finding> {
        let mut findings = Vec::new();

        for loaded in &self.checks {
            match AssertUnwindSafe(loaded.check.execute(exchange))
                .catch_unwind()
                .await
            {
                Ok(Ok(raw)) => findings.extend(
                    raw.into_iter()
                        .map(|r| normalize(&loaded.name, loaded.severity, r, exchange, labels)),
                ),
                Ok(Err(e)) => warn!(
                    check = %loaded.name,
                    suite = %labels.suite,
                    test = %labels.test,
                    error = %e,
                    "security check failed; skipping"
                ),
                Err(_) => warn!(
                    check = %loaded.name,
                    suite = %labels.suite,
                    test = %labels.test,
                    "security check panicked; skipping"
                ),
            }
        }

        findings
    }
}

fn normalize(
    check: &str,
    configured: Option<Severity>,
    raw: RawFinding,
    exchange: &Exchange<'_>,
    labels: &IssueLabels,
) -> Finding {
    let title = match (&raw.title, &raw.finding_type) {
        (Some(title), _) => title.clone(),
        (None, Some(t)) => title_case(t),
        (None, None) => format!("{} finding", check),
    };
    let finding_type = raw.finding_type.unwrap_or_else(|| check.to_string());
    let cwe = raw
        .cwe
        .unwrap_or_else(|| cwe::lookup(&finding_type).to_string());

    Finding {
        check: check.to_string(),
        severity: raw.severity.or(configured).unwrap_or_default(),
        description: raw.description.unwrap_or_else(|| title.clone()),
        remediation: raw.remediation.unwrap_or_else(|| {
            format!(
                "Review the '{}' security guidance and harden {}",
                check, exchange.endpoint
            )
        }),
        title,
        finding_type,
        endpoint: exchange.endpoint.path.clone(),
        method: exchange.endpoint.method.to_string(),
        location: raw.location.unwrap_or_else(|| "response".to_string()),
        suite: labels.suite.clone(),
        test: labels.test.clone(),
        evidence: raw.evidence,
        cwe,
    }
}

static CHECK_REGISTRY: Lazy<FactoryRegistry<dyn SecurityCheck>> = Lazy::new(|| {
    let registry = FactoryRegistry::new();
    checks::install(&registry);
    registry
});

/// Process-wide check registry, pre-filled with the built-in checks
pub fn check_registry() -> &'static FactoryRegistry<dyn SecurityCheck> {
    &CHECK_REGISTRY
}
