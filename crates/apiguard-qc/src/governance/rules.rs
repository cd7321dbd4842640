//! Built-in governance rules

use super::{GovernanceRule, RawViolation};
use crate::config::PluginConfig;
use crate::issue::{Exchange, Severity};
use crate::registry::FactoryRegistry;
use apiguard_http::{HttpMethod, HttpRequestLike, HttpResponseLike};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;

static VERSION_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v\d+(\.\d+)?$").expect("valid version regex"));
static KEBAB_CASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid kebab regex"));
static ID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}|[0-9a-fA-F]{16,}|\{[^}]+\}|:[A-Za-z_]+)$")
        .expect("valid id regex")
});

/// Register the built-in rules
pub(crate) fn install(registry: &FactoryRegistry<dyn GovernanceRule>) {
    registry.insert("versioning", |c: &PluginConfig| {
        Ok(Arc::new(VersioningRule::from_config(c)?) as Arc<dyn GovernanceRule>)
    });
    registry.insert("naming-conventions", |c: &PluginConfig| {
        Ok(Arc::new(NamingConventionsRule::from_config(c)?) as Arc<dyn GovernanceRule>)
    });
    registry.insert("error-format", |_: &PluginConfig| {
        Ok(Arc::new(ErrorFormatRule) as Arc<dyn GovernanceRule>)
    });
    registry.insert("status-codes", |_: &PluginConfig| {
        Ok(Arc::new(StatusCodesRule) as Arc<dyn GovernanceRule>)
    });
    registry.insert("response-time", |c: &PluginConfig| {
        Ok(Arc::new(ResponseTimeRule::from_config(c)?) as Arc<dyn GovernanceRule>)
    });
}

fn is_id_segment(segment: &str) -> bool {
    ID_SEGMENT.is_match(segment)
}

// =====================
// versioning
// =====================

/// Endpoints must carry a version, either as a `/v1/` path segment or in a
/// configured header (`header: api-version`).
#[derive(Debug, Clone, Default)]
pub struct VersioningRule {
    header: Option<String>,
}

impl VersioningRule {
    pub fn from_config(config: &PluginConfig) -> anyhow::Result<Self> {
        Ok(Self {
            header: config.option::<String>("header")?,
        })
    }
}

#[async_trait]
impl GovernanceRule for VersioningRule {
    fn name(&self) -> &str {
        "versioning"
    }

    async fn validate(&self, exchange: &Exchange<'_>) -> anyhow::Result<Vec<RawViolation>> {
        if exchange
            .endpoint
            .segments()
            .any(|s| VERSION_SEGMENT.is_match(s))
        {
            return Ok(Vec::new());
        }

        if let Some(header) = &self.header {
            if exchange.request.header(header).is_some()
                || exchange.response.header(header).is_some()
            {
                return Ok(Vec::new());
            }
        }

        let mut message = format!(
            "Endpoint '{}' is not versioned; expected a path segment such as /v1/",
            exchange.endpoint.path
        );
        if let Some(header) = &self.header {
            message.push_str(&format!(" or a '{}' header", header));
        }

        Ok(vec![RawViolation::new(message)
            .title("Missing API Version")
            .location("path")
            .remediation("Prefix the route with a major version, e.g. /v1/users")])
    }
}

// =====================
// naming-conventions
// =====================

const UNCOUNTABLE: &[&str] = &[
    "auth", "config", "data", "health", "info", "login", "logout", "me", "metadata", "search",
    "status", "graphql",
];

/// Lowercase kebab-case path segments with plural collection names
#[derive(Debug, Clone, Default)]
pub struct NamingConventionsRule {
    /// Extra segment names accepted as-is
    allow: Vec<String>,
}

impl NamingConventionsRule {
    pub fn from_config(config: &PluginConfig) -> anyhow::Result<Self> {
        Ok(Self {
            allow: config.option::<Vec<String>>("allow")?.unwrap_or_default(),
        })
    }

    fn is_allowed(&self, segment: &str) -> bool {
        UNCOUNTABLE.contains(&segment) || self.allow.iter().any(|a| a == segment)
    }
}

fn looks_plural(segment: &str) -> bool {
    let last_word = segment.rsplit('-').next().unwrap_or(segment);
    last_word.ends_with('s') && !last_word.ends_with("ss")
}

#[async_trait]
impl GovernanceRule for NamingConventionsRule {
    fn name(&self) -> &str {
        "naming-conventions"
    }

    async fn validate(&self, exchange: &Exchange<'_>) -> anyhow::Result<Vec<RawViolation>> {
        let segments: Vec<&str> = exchange
            .endpoint
            .segments()
            .filter(|s| !VERSION_SEGMENT.is_match(s))
            .collect();

        let mut violations = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            if is_id_segment(segment) || self.is_allowed(segment) {
                continue;
            }

            if !KEBAB_CASE.is_match(segment) {
                violations.push(
                    RawViolation::new(format!(
                        "Path segment '{}' is not lowercase kebab-case",
                        segment
                    ))
                    .category("naming")
                    .location("path")
                    .remediation("Use lowercase words separated by hyphens, e.g. /user-profiles")
                    .evidence(json!({ "segment": segment })),
                );
                continue;
            }

            // The first resource and anything addressed by an id are collections
            let is_collection = i == 0
                || segments
                    .get(i + 1)
                    .map(|next| is_id_segment(next))
                    .unwrap_or(false);
            if is_collection && !looks_plural(segment) {
                violations.push(
                    RawViolation::new(format!(
                        "Collection '{}' should use a plural noun",
                        segment
                    ))
                    .category("naming")
                    .location("path")
                    .remediation(format!("Rename the collection, e.g. /{}s", segment))
                    .evidence(json!({ "segment": segment })),
                );
            }
        }

        Ok(violations)
    }
}

// =====================
// error-format
// =====================

/// Error responses must be JSON objects carrying `error` or `message`
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorFormatRule;

#[async_trait]
impl GovernanceRule for ErrorFormatRule {
    fn name(&self) -> &str {
        "error-format"
    }

    async fn validate(&self, exchange: &Exchange<'_>) -> anyhow::Result<Vec<RawViolation>> {
        let response = exchange.response;
        if response.status_code < 400 {
            return Ok(Vec::new());
        }

        let well_formed = response
            .json_body()
            .and_then(|body| {
                body.as_object()
                    .map(|o| o.contains_key("error") || o.contains_key("message"))
            })
            .unwrap_or(false);

        if well_formed {
            return Ok(Vec::new());
        }

        Ok(vec![RawViolation::new(format!(
            "Error response ({}) is not a JSON object with an 'error' or 'message' field",
            response.status_code
        ))
        .location("body")
        .remediation("Return errors as {\"error\": {\"code\": ..., \"message\": ...}}")
        .evidence(json!({ "status": response.status_code, "contentType": response.content_type() }))])
    }
}

// =====================
// status-codes
// =====================

/// Status codes that fit the method
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCodesRule;

#[async_trait]
impl GovernanceRule for StatusCodesRule {
    fn name(&self) -> &str {
        "status-codes"
    }

    async fn validate(&self, exchange: &Exchange<'_>) -> anyhow::Result<Vec<RawViolation>> {
        let status = exchange.response.status();
        let code = status.code();

        if status.is_server_error() {
            return Ok(vec![RawViolation::new(format!(
                "Server error {} returned from {}",
                code, exchange.endpoint
            ))
            .severity(Severity::High)
            .title("Server Error")
            .location("status")]);
        }
        if !status.is_success() {
            return Ok(Vec::new());
        }

        let expected: &[u16] = match exchange.endpoint.method {
            HttpMethod::Post => &[201, 202],
            HttpMethod::Delete => &[200, 202, 204],
            _ => return Ok(Vec::new()),
        };
        if expected.contains(&code) {
            return Ok(Vec::new());
        }

        Ok(vec![RawViolation::new(format!(
            "{} returned {}; expected one of {:?}",
            exchange.endpoint.method, code, expected
        ))
        .title("Unexpected Success Status")
        .location("status")
        .evidence(json!({ "status": code, "expected": expected }))])
    }
}

// =====================
// response-time
// =====================

const DEFAULT_MAX_MS: u64 = 1000;

/// Round-trip latency budget (`maxMs`, default 1000)
#[derive(Debug, Clone, Copy)]
pub struct ResponseTimeRule {
    max_ms: u64,
}

impl ResponseTimeRule {
    pub fn new(max_ms: u64) -> Self {
        Self { max_ms }
    }

    pub fn from_config(config: &PluginConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.option::<u64>("maxMs")?.unwrap_or(DEFAULT_MAX_MS),
        ))
    }
}

impl Default for ResponseTimeRule {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MS)
    }
}

#[async_trait]
impl GovernanceRule for ResponseTimeRule {
    fn name(&self) -> &str {
        "response-time"
    }

    async fn validate(&self, exchange: &Exchange<'_>) -> anyhow::Result<Vec<RawViolation>> {
        let took = exchange.response.duration_ms;
        if took <= self.max_ms {
            return Ok(Vec::new());
        }
        Ok(vec![RawViolation::new(format!(
            "Response took {}ms, over the {}ms budget",
            took, self.max_ms
        ))
        .category("performance")
        .location("timing")
        .evidence(json!({ "durationMs": took, "maxMs": self.max_ms }))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::Endpoint;
    use apiguard_http::{HttpRequest, HttpResponse, HttpResponseBuilder, RequestBuilder};

    struct Fixture {
        request: HttpRequest,
        response: HttpResponse,
        endpoint: Endpoint,
    }

    impl Fixture {
        fn new(method: HttpMethod, path: &str, response: HttpResponse) -> Self {
            let url = format!("http://localhost{}", path);
            Self {
                request: RequestBuilder::new(method, url.clone()).build(),
                response,
                endpoint: Endpoint {
                    method,
                    path: path.to_string(),
                    url,
                },
            }
        }

        fn exchange(&self) -> Exchange<'_> {
            Exchange {
                request: &self.request,
                response: &self.response,
                endpoint: &self.endpoint,
            }
        }
    }

    fn ok() -> HttpResponse {
        HttpResponseBuilder::new().status_code(200).build()
    }

    #[tokio::test]
    async fn test_versioning() {
        let rule = VersioningRule::default();
        let f = Fixture::new(HttpMethod::Get, "/v1/users", ok());
        assert!(rule.validate(&f.exchange()).await.unwrap().is_empty());

        let f = Fixture::new(HttpMethod::Get, "/user", ok());
        let found = rule.validate(&f.exchange()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].location.as_deref(), Some("path"));
    }

    #[tokio::test]
    async fn test_versioning_header() {
        let config = PluginConfig::enabled().with_option("header", json!("API-Version"));
        let rule = VersioningRule::from_config(&config).unwrap();
        let response = HttpResponseBuilder::new().header("api-version", "2").build();
        let f = Fixture::new(HttpMethod::Get, "/users", response);
        assert!(rule.validate(&f.exchange()).await.unwrap().is_empty());

        let mut f = Fixture::new(HttpMethod::Get, "/users", ok());
        assert_eq!(rule.validate(&f.exchange()).await.unwrap().len(), 1);
        f.request.headers.insert("Api-Version".into(), "2".into());
        assert!(rule.validate(&f.exchange()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_naming_conventions() {
        let rule = NamingConventionsRule::default();

        let f = Fixture::new(HttpMethod::Get, "/v1/users/42/order-items", ok());
        assert!(rule.validate(&f.exchange()).await.unwrap().is_empty());

        let f = Fixture::new(HttpMethod::Get, "/user", ok());
        let found = rule.validate(&f.exchange()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].message.as_ref().unwrap().contains("plural"));

        let f = Fixture::new(HttpMethod::Get, "/v1/userProfiles", ok());
        let found = rule.validate(&f.exchange()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].message.as_ref().unwrap().contains("kebab-case"));

        let f = Fixture::new(HttpMethod::Get, "/health", ok());
        assert!(rule.validate(&f.exchange()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_format() {
        let rule = ErrorFormatRule;
        let good = HttpResponseBuilder::new()
            .status_code(404)
            .json(json!({"error": "not found"}))
            .build();
        let f = Fixture::new(HttpMethod::Get, "/v1/users/9", good);
        assert!(rule.validate(&f.exchange()).await.unwrap().is_empty());

        let bad = HttpResponseBuilder::new()
            .status_code(500)
            .body("Internal Server Error")
            .build();
        let f = Fixture::new(HttpMethod::Get, "/v1/users/9", bad);
        assert_eq!(rule.validate(&f.exchange()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_codes() {
        let rule = StatusCodesRule;
        let f = Fixture::new(HttpMethod::Post, "/v1/users", ok());
        assert_eq!(rule.validate(&f.exchange()).await.unwrap().len(), 1);

        let created = HttpResponseBuilder::new().status_code(201).build();
        let f = Fixture::new(HttpMethod::Post, "/v1/users", created);
        assert!(rule.validate(&f.exchange()).await.unwrap().is_empty());

        let failed = HttpResponseBuilder::new().status_code(503).build();
        let f = Fixture::new(HttpMethod::Get, "/v1/users", failed);
        let found = rule.validate(&f.exchange()).await.unwrap();
        assert_eq!(found[0].severity, Some(Severity::High));
    }

    #[tokio::test]
    async fn test_response_time() {
        let rule = ResponseTimeRule::from_config(
            &PluginConfig::enabled().with_option("maxMs", json!(100)),
        )
        .unwrap();
        let slow = HttpResponseBuilder::new().duration_ms(250).build();
        let f = Fixture::new(HttpMethod::Get, "/v1/users", slow);
        let found = rule.validate(&f.exchange()).await.unwrap();
        assert_eq!(found[0].evidence, Some(json!({"durationMs": 250, "maxMs": 100})));

        let fast = HttpResponseBuilder::new().duration_ms(20).build();
        let f = Fixture::new(HttpMethod::Get, "/v1/users", fast);
        assert!(rule.validate(&f.exchange()).await.unwrap().is_empty());
    }

    #[test]
    fn test_bad_option_type_is_a_factory_error() {
        let config = PluginConfig::enabled().with_option("maxMs", json!("fast"));
        assert!(ResponseTimeRule::from_config(&config).is_err());
    }
}
