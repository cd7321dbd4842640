//! Run configuration
//!
//! Loaded from JSON, YAML or TOML. Keys are camelCase in every format:
//!
//! ```yaml
//! testMatch: ["Users*"]
//! timeout: 5000
//! retries: 1
//! bail: false
//! baseUrl: http://localhost:8080
//! governance:
//!   enabled: true
//!   rules:
//!     versioning: { enabled: true, severity: error }
//!     response-time: { maxMs: 500 }
//! security:
//!   enabled: true
//!   checks:
//!     ssl-tls: { enabled: true }
//! thresholds:
//!   governanceViolations: { error: 0, warning: 10 }
//!   securityFindings: { critical: 0, high: 0 }
//!   testPassRate: 95
//! ```

use crate::error::ConfigError;
use crate::issue::Severity;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::Path;

/// Default per-test timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Top-level run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfig {
    /// Globs matched against top-level suite names; empty means all suites
    pub test_match: Vec<String>,
    /// Default per-test timeout (ms)
    pub timeout: u64,
    /// Default retry count
    pub retries: u32,
    /// Stop after the first failing test
    pub bail: bool,
    /// Base URL for relative request paths
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub governance: GovernanceConfig,
    pub security: SecurityConfig,
    pub thresholds: Thresholds,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            test_match: Vec::new(),
            timeout: DEFAULT_TIMEOUT_MS,
            retries: 0,
            bail: false,
            base_url: None,
            governance: GovernanceConfig::default(),
            security: SecurityConfig::default(),
            thresholds: Thresholds::default(),
        }
    }
}

/// Governance engine section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GovernanceConfig {
    pub enabled: bool,
    /// Rule name -> rule config; rules absent here are not loaded
    pub rules: BTreeMap<String, PluginConfig>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: BTreeMap::new(),
        }
    }
}

/// Security scanner section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    pub enabled: bool,
    /// Check name -> check config; checks absent here are not loaded
    pub checks: BTreeMap<String, PluginConfig>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            checks: BTreeMap::new(),
        }
    }
}

/// Configuration for a single rule or check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Rule-specific options (`maxMs`, `headers`, ...)
    #[serde(flatten)]
    pub options: Map<String, JsonValue>,
}

fn default_true() -> bool {
    true
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            severity: None,
            options: Map::new(),
        }
    }
}

impl PluginConfig {
    pub fn enabled() -> Self {
        Self::default()
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Typed option lookup; `Ok(None)` when the key is absent
    pub fn option<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.options.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| anyhow::anyhow!("option '{}': {}", key, e)),
        }
    }
}

/// Caps consulted by the threshold gate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    pub governance_violations: GovernanceThresholds,
    pub security_findings: SecurityThresholds,
    /// Minimum success rate in percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_pass_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceThresholds {
    /// Max violations (error-level)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<usize>,
    /// Max warnings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityThresholds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<usize>,
}

impl SecurityThresholds {
    /// Cap for a severity, if configured
    pub fn cap(&self, severity: Severity) -> Option<usize> {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => None,
        }
    }
}

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "JSON",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Toml => "TOML",
        }
    }
}

impl RunConfig {
    /// Read, parse and validate a config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, format)
    }

    /// Parse and validate config text
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let parse_error = |message: String| ConfigError::Parse {
            format: format.name(),
            message,
        };
        let config: RunConfig = match format {
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))?
            }
            ConfigFormat::Yaml => {
                // An empty YAML document means "all defaults"
                if content.trim().is_empty() {
                    RunConfig::default()
                } else {
                    serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))?
                }
            }
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string()))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot drive a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout == 0 {
            return Err(ConfigError::Invalid("timeout must be greater than 0".into()));
        }
        if let Some(rate) = self.thresholds.test_pass_rate {
            if !(0.0..=100.0).contains(&rate) {
                return Err(ConfigError::Invalid(format!(
                    "thresholds.testPassRate must be within 0..=100, got {}",
                    rate
                )));
            }
        }
        for pattern in &self.test_match {
            glob_to_regex(pattern)?;
        }
        Ok(())
    }

    /// Compiled `testMatch` globs
    pub fn suite_patterns(&self) -> Result<Vec<Regex>, ConfigError> {
        self.test_match.iter().map(|p| glob_to_regex(p)).collect()
    }
}

/// Translate a `*`/`?` glob into an anchored regex
pub fn glob_to_regex(glob: &str) -> Result<Regex, ConfigError> {
    if glob.trim().is_empty() {
        return Err(ConfigError::Invalid("testMatch patterns must not be empty".into()));
    }
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
        .map_err(|e| ConfigError::Invalid(format!("bad testMatch pattern '{}': {}", glob, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.timeout, 30_000);
        assert_eq!(config.retries, 0);
        assert!(config.governance.enabled);
        assert!(config.security.checks.is_empty());
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "timeout": 5000,
            "bail": true,
            "governance": {"rules": {"versioning": {"severity": "error"},
                                      "response-time": {"enabled": false, "maxMs": 200}}},
            "security": {"checks": {"ssl-tls": {"enabled": true}}},
            "thresholds": {"governanceViolations": {"error": 0}, "testPassRate": 90}
        }"#;
        let config = RunConfig::parse(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.timeout, 5000);
        assert!(config.bail);

        let versioning = &config.governance.rules["versioning"];
        assert!(versioning.enabled);
        assert_eq!(versioning.severity, Some(Severity::High));

        let response_time = &config.governance.rules["response-time"];
        assert!(!response_time.enabled);
        assert_eq!(response_time.option::<u64>("maxMs").unwrap(), Some(200));

        assert_eq!(config.thresholds.governance_violations.error, Some(0));
        assert_eq!(config.thresholds.test_pass_rate, Some(90.0));
    }

    #[test]
    fn test_parse_yaml_and_toml_agree() {
        let yaml = "testMatch: [\"Users*\"]\nretries: 2\nsecurity:\n  checks:\n    cors: {}\n";
        let toml_text = "testMatch = [\"Users*\"]\nretries = 2\n[security.checks.cors]\n";
        let from_yaml = RunConfig::parse(yaml, ConfigFormat::Yaml).unwrap();
        let from_toml = RunConfig::parse(toml_text, ConfigFormat::Toml).unwrap();
        assert_eq!(from_yaml, from_toml);
        assert!(from_yaml.security.checks["cors"].enabled);
    }

    #[test]
    fn test_validation_failures() {
        assert!(matches!(
            RunConfig::parse(r#"{"timeout": 0}"#, ConfigFormat::Json),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RunConfig::parse(r#"{"thresholds": {"testPassRate": 150}}"#, ConfigFormat::Json),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RunConfig::parse(r#"{"timeout": "soon"}"#, ConfigFormat::Json),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_from_path_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "timeout: 1234").unwrap();
        let config = RunConfig::from_path(file.path()).unwrap();
        assert_eq!(config.timeout, 1234);

        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            RunConfig::from_path(file.path()),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("Users*").unwrap();
        assert!(re.is_match("Users API"));
        assert!(!re.is_match("Orders"));
        let re = glob_to_regex("v? (beta)").unwrap();
        assert!(re.is_match("v2 (beta)"));
        assert!(glob_to_regex("  ").is_err());
    }
}
