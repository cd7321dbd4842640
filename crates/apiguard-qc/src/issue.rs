//! Vocabulary shared by governance violations and security findings

use apiguard_http::{HttpMethod, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Issue severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    /// Rules configured with `severity: error` land here
    #[serde(alias = "error")]
    High,
    #[default]
    Medium,
    /// Rules configured with `severity: warning` land here
    #[serde(alias = "warning")]
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Governance issues at this level are reported as warnings rather than violations
    pub fn is_warning(&self) -> bool {
        matches!(self, Severity::Low | Severity::Info)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" | "error" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" | "warning" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Suite/test attribution carried by every issue raised during a test
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueLabels {
    pub suite: String,
    pub test: String,
}

impl IssueLabels {
    pub fn new(suite: impl Into<String>, test: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            test: test.into(),
        }
    }
}

/// The endpoint an exchange targeted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: HttpMethod,
    /// URL path without query string, e.g. `/v1/users/42`
    pub path: String,
    /// Absolute URL as sent
    pub url: String,
}

impl Endpoint {
    /// Derive the endpoint from an absolute request URL
    pub fn from_url(method: HttpMethod, url: &url::Url) -> Self {
        Self {
            method,
            path: url.path().to_string(),
            url: url.to_string(),
        }
    }

    /// Non-empty path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    pub fn is_https(&self) -> bool {
        self.url.starts_with("https://")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// One request/response pair handed to every rule and check
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
    pub request: &'a HttpRequest,
    pub response: &'a HttpResponse,
    pub endpoint: &'a Endpoint,
}

/// `"missing-security-header"` -> `"Missing Security Header"`
pub fn title_case(raw: &str) -> String {
    raw.split(|c| c == '-' || c == '_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_aliases() {
        let s: Severity = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(s, Severity::High);
        let s: Severity = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(s, Severity::Low);
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        assert_eq!("WARNING".parse::<Severity>().unwrap(), Severity::Low);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical < Severity::High);
        assert!(Severity::Low.is_warning());
        assert!(!Severity::Medium.is_warning());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("missing-security-header"), "Missing Security Header");
        assert_eq!(title_case("insecure_transport"), "Insecure Transport");
        assert_eq!(title_case("xss"), "Xss");
        assert_eq!(title_case("--"), "");
    }

    #[test]
    fn test_endpoint_from_url() {
        let url = url::Url::parse("http://localhost:8080/v1/users/42?x=1").unwrap();
        let endpoint = Endpoint::from_url(HttpMethod::Get, &url);
        assert_eq!(endpoint.path, "/v1/users/42");
        assert_eq!(endpoint.segments().collect::<Vec<_>>(), vec!["v1", "users", "42"]);
        assert!(!endpoint.is_https());
        assert_eq!(endpoint.to_string(), "GET /v1/users/42");
    }
}
