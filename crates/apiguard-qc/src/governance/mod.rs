//! API design governance
//!
//! A [`GovernanceEngine`] holds the rules loaded from configuration (plus any
//! added at runtime) and runs all of them against each HTTP exchange a test
//! performs. Rules return loosely-filled [`RawViolation`]s; the engine fills
//! in defaults and attaches the suite/test labels so every [`Violation`]
//! leaving the engine has the same shape.

pub mod rules;

use crate::config::GovernanceConfig;
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

/// Governance rule - every rule, built-in or ad hoc, implements this
#[async_trait]
pub trait GovernanceRule: Send + Sync {
    /// Rule name (matches its config key)
    fn name(&self) -> &str;

    /// Inspect one exchange; an empty list means "no issues"
    async fn validate(&self, exchange: &Exchange<'_>) -> anyhow::Result<Vec<RawViolation>>;
}

/// A violation as emitted by a rule; any field may be left out
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawViolation {
    pub category: Option<String>,
    pub severity: Option<Severity>,
    pub message: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub remediation: Option<String>,
    pub evidence: Option<JsonValue>,
}

impl RawViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
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

/// Normalized governance violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub rule: String,
    pub category: String,
    pub severity: Severity,
    pub message: String,
    pub title: String,
    pub endpoint: String,
    pub method: String,
    pub location: String,
    pub remediation: String,
    pub suite: String,
    pub test: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<JsonValue>,
}

struct LoadedRule {
    name: String,
    severity: Option<Severity>,
    rule: Arc<dyn GovernanceRule>,
}

/// Runs every loaded rule against an exchange
#[derive(Default)]
pub struct GovernanceEngine {
    rules: Vec<LoadedRule>,
}

impl GovernanceEngine {
    /// Engine with no rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every enabled rule named in `config`, in name order
    pub fn from_config(
        config: &GovernanceConfig,
        registry: &FactoryRegistry<dyn GovernanceRule>,
    ) -> Result<Self, EngineError> {
        let mut engine = Self::new();
        if !config.enabled {
            return Ok(engine);
        }

        for (name, rule_config) in config.rules.iter().filter(|(_, c)| c.enabled) {
            let rule = registry
                .create(name, rule_config)
                .ok_or_else(|| EngineError::UnknownRule(name.clone()))?
                .map_err(|e| EngineError::Factory {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            engine.rules.push(LoadedRule {
                name: name.clone(),
                severity: rule_config.severity,
                rule,
            });
        }

        debug!(rules = ?engine.rule_names(), "governance rules loaded");
        Ok(engine)
    }

    /// Register an ad-hoc rule after the configured ones
    pub fn add_rule(&mut self, rule: Arc<dyn GovernanceRule>) -> &mut Self {
        self.rules.push(LoadedRule {
            name: rule.name().to_string(),
            severity: None,
            rule,
        });
        self
    }

    /// Register an ad-hoc rule with a configured severity
    pub fn add_rule_with_severity(
        &mut self,
        rule: Arc<dyn GovernanceRule>,
        severity: Severity,
    ) -> &mut Self {
        self.rules.push(LoadedRule {
            name: rule.name().to_string(),
            severity: Some(severity),
            rule,
        });
        self
    }

    /// Loaded rule names in execution order
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run all rules, in order, against one exchange.
    ///
    /// A rule that errors or panics is logged and contributes nothing.
    pub async fn check(&self, exchange: &Exchange<'_>, labels: &IssueLabels) -> Vec<Violation> {
        let mut violations = Vec::new();

        for loaded in &self.rules {
            let outcome = AssertUnwindSafe(loaded.rule.validate(exchange))
                .catch_unwind()
                .await;

            let raw = match outcome {
                Ok(Ok(raw)) => raw,
                Ok(Err(e)) => {
                    warn!(
                        rule = %loaded.name,
                        suite = %labels.suite,
                        test = %labels.test,
                        error = %e,
                        "governance rule failed; skipping"
                    );
                    continue;
                }
                Err(_) => {
                    warn!(
                        rule = %loaded.name,
                        suite = %labels.suite,
                        test = %labels.test,
                        "governance rule panicked; skipping"
                    );
                    continue;
                }
            };

            violations.extend(
                raw.into_iter()
                    .map(|r| normalize(&loaded.name, loaded.severity, r, exchange, labels)),
            );
        }

        violations
    }
}

fn normalize(
    rule: &str,
    configured: Option<Severity>,
    raw: RawViolation,
    exchange: &Exchange<'_>,
    labels: &IssueLabels,
) -> Violation {
    let title = raw.title.unwrap_or_else(|| title_case(rule));
    Violation {
        rule: rule.to_string(),
        category: raw.category.unwrap_or_else(|| rule.to_string()),
        severity: raw.severity.or(configured).unwrap_or_default(),
        message: raw
            .message
            .unwrap_or_else(|| format!("{} rule violated", title)),
        remediation: raw.remediation.unwrap_or_else(|| {
            format!(
                "Review the '{}' guideline and update {} to comply",
                rule, exchange.endpoint
            )
        }),
        title,
        endpoint: exchange.endpoint.path.clone(),
        method: exchange.endpoint.method.to_string(),
        location: raw.location.unwrap_or_else(|| "response".to_string()),
        suite: labels.suite.clone(),
        test: labels.test.clone(),
        evidence: raw.evidence,
    }
}

static RULE_REGISTRY: Lazy<FactoryRegistry<dyn GovernanceRule>> = Lazy::new(|| {
    let registry = FactoryRegistry::new();
    rules::install(&registry);
    registry
});

/// Process-wide rule registry, pre-filled with the built-in rules
pub fn rule_registry() -> &'static FactoryRegistry<dyn GovernanceRule> {
    &RULE_REGISTRY
}
