//! Built-in security checks

use super::{RawFinding, SecurityCheck};
use crate::config::PluginConfig;
use crate::issue::{Exchange, Severity};
use crate::registry::FactoryRegistry;
use apiguard_http::{HttpRequestLike, HttpResponseLike};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

static VERSIONED_SERVER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\s*\d+(\.\d+)*").expect("valid server regex"));
static STACK_TRACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)(Traceback \(most recent call last\)|Exception in thread|^\s+at [\w.$<>]+\(.*:\d+\)|\.rs:\d+:\d+|panicked at)",
    )
    .expect("valid stack trace regex")
});
static SECRET_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(password|passwd|pwd|secret|client[_-]?secret|api[_-]?key|access[_-]?token|refresh[_-]?token|token|private[_-]?key|ssn|credit[_-]?card|card[_-]?number)$")
        .expect("valid secret key regex")
});

/// Register the built-in checks
pub(crate) fn install(registry: &FactoryRegistry<dyn SecurityCheck>) {
    registry.insert("ssl-tls", |_: &PluginConfig| {
        Ok(Arc::new(SslTlsCheck) as Arc<dyn SecurityCheck>)
    });
    registry.insert("security-headers", |c: &PluginConfig| {
        Ok(Arc::new(SecurityHeadersCheck::from_config(c)?) as Arc<dyn SecurityCheck>)
    });
    registry.insert("cors", |_: &PluginConfig| {
        Ok(Arc::new(CorsCheck) as Arc<dyn SecurityCheck>)
    });
    registry.insert("information-disclosure", |_: &PluginConfig| {
        Ok(Arc::new(InformationDisclosureCheck) as Arc<dyn SecurityCheck>)
    });
    registry.insert("sensitive-data", |_: &PluginConfig| {
        Ok(Arc::new(SensitiveDataCheck) as Arc<dyn SecurityCheck>)
    });
}

/// Plain-HTTP transport and missing HSTS
#[derive(Debug, Clone, Copy, Default)]
pub struct SslTlsCheck;

#[async_trait]
impl SecurityCheck for SslTlsCheck {
    fn name(&self) -> &str {
        "ssl-tls"
    }

    async fn execute(&self, exchange: &Exchange<'_>) -> anyhow::Result<Vec<RawFinding>> {
        if !exchange.endpoint.is_https() {
            return Ok(vec![RawFinding::new(
                "insecure-transport",
                format!("{} was requested over plain HTTP", exchange.endpoint.url),
            )
            .severity(Severity::High)
            .location("transport")
            .remediation("Serve the API over HTTPS only and redirect plain HTTP")]);
        }

        if exchange.response.header("strict-transport-security").is_none() {
            return Ok(vec![RawFinding::new(
                "missing-hsts",
                "HTTPS response does not set Strict-Transport-Security",
            )
            .severity(Severity::Medium)
            .location("headers")
            .remediation("Add Strict-Transport-Security: max-age=31536000; includeSubDomains")]);
        }

        Ok(Vec::new())
    }
}

const DEFAULT_REQUIRED_HEADERS: &[&str] = &[
    "x-content-type-options",
    "x-frame-options",
    "content-security-policy",
];

/// Required response headers (`headers: [...]` overrides the default set)
#[derive(Debug, Clone)]
pub struct SecurityHeadersCheck {
    required: Vec<String>,
}

impl SecurityHeadersCheck {
    pub fn from_config(config: &PluginConfig) -> anyhow::Result<Self> {
        let required = config
            .option::<Vec<String>>("headers")?
            .unwrap_or_else(|| DEFAULT_REQUIRED_HEADERS.iter().map(|h| h.to_string()).collect());
        Ok(Self { required })
    }
}

impl Default for SecurityHeadersCheck {
    fn default() -> Self {
        Self {
            required: DEFAULT_REQUIRED_HEADERS.iter().map(|h| h.to_string()).collect(),
        }
    }
}

#[async_trait]
impl SecurityCheck for SecurityHeadersCheck {
    fn name(&self) -> &str {
        "security-headers"
    }

    async fn execute(&self, exchange: &Exchange<'_>) -> anyhow::Result<Vec<RawFinding>> {
        let response = exchange.response;
        let mut findings: Vec<RawFinding> = self
            .required
            .iter()
            .filter(|h| response.header(h).is_none())
            .map(|h| {
                RawFinding::new(
                    "missing-security-header",
                    format!("Response is missing the {} header", h),
                )
                .location("headers")
                .evidence(json!({ "header": h }))
            })
            .collect();

        if let Some(value) = response.header("x-content-type-options") {
            if !value.eq_ignore_ascii_case("nosniff") {
                findings.push(
                    RawFinding::new(
                        "missing-security-header",
                        format!("X-Content-Type-Options is '{}', expected 'nosniff'", value),
                    )
                    .severity(Severity::Low)
                    .location("headers"),
                );
            }
        }

        Ok(findings)
    }
}

/// Permissive cross-origin policies
#[derive(Debug, Clone, Copy, Default)]
pub struct CorsCheck;

#[async_trait]
impl SecurityCheck for CorsCheck {
    fn name(&self) -> &str {
        "cors"
    }

    async fn execute(&self, exchange: &Exchange<'_>) -> anyhow::Result<Vec<RawFinding>> {
        let response = exchange.response;
        let Some(origin) = response.header("access-control-allow-origin") else {
            return Ok(Vec::new());
        };
        let credentials = response
            .header("access-control-allow-credentials")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let evidence = json!({ "allowOrigin": origin, "allowCredentials": credentials });

        if origin.trim() == "*" {
            let (severity, description) = if credentials {
                (
                    Severity::High,
                    "Wildcard Access-Control-Allow-Origin combined with credentials",
                )
            } else {
                (Severity::Medium, "Access-Control-Allow-Origin allows any origin")
            };
            return Ok(vec![RawFinding::new("cors-misconfiguration", description)
                .severity(severity)
                .location("headers")
                .remediation("Allow-list trusted origins explicitly")
                .evidence(evidence)]);
        }

        let reflected = exchange.request.header("origin") == Some(origin);
        if reflected && credentials {
            return Ok(vec![RawFinding::new(
                "cors-misconfiguration",
                "Request Origin is reflected into Access-Control-Allow-Origin with credentials",
            )
            .severity(Severity::High)
            .location("headers")
            .evidence(evidence)]);
        }

        Ok(Vec::new())
    }
}

/// Server fingerprints and leaked stack traces
#[derive(Debug, Clone, Copy, Default)]
pub struct InformationDisclosureCheck;

#[async_trait]
impl SecurityCheck for InformationDisclosureCheck {
    fn name(&self) -> &str {
        "information-disclosure"
    }

    async fn execute(&self, exchange: &Exchange<'_>) -> anyhow::Result<Vec<RawFinding>> {
        let response = exchange.response;
        let mut findings = Vec::new();

        if let Some(server) = response.header("server") {
            if VERSIONED_SERVER.is_match(server) {
                findings.push(
                    RawFinding::new(
                        "information-disclosure",
                        format!("Server header discloses a version: {}", server),
                    )
                    .severity(Severity::Low)
                    .location("headers")
                    .evidence(json!({ "server": server })),
                );
            }
        }

        if let Some(powered_by) = response.header("x-powered-by") {
            findings.push(
                RawFinding::new(
                    "information-disclosure",
                    format!("X-Powered-By header discloses the stack: {}", powered_by),
                )
                .severity(Severity::Low)
                .location("headers")
                .evidence(json!({ "xPoweredBy": powered_by })),
            );
        }

        let body = String::from_utf8_lossy(&response.body);
        if let Some(m) = STACK_TRACE.find(&body) {
            findings.push(
                RawFinding::new("verbose-error", "Response body contains a stack trace")
                    .severity(Severity::Medium)
                    .location("body")
                    .remediation("Return generic error messages and log details server-side")
                    .evidence(json!({ "match": m.as_str().trim() })),
            );
        }

        Ok(findings)
    }
}

/// Secrets in JSON bodies and credentials in query strings
#[derive(Debug, Clone, Copy, Default)]
pub struct SensitiveDataCheck;

fn collect_secret_paths(value: &JsonValue, path: &str, out: &mut Vec<String>) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                let exposed = matches!(child, JsonValue::String(s) if !s.is_empty());
                if exposed && SECRET_KEY.is_match(key) {
                    out.push(child_path);
                } else {
                    collect_secret_paths(child, &child_path, out);
                }
            }
        }
        JsonValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_secret_paths(item, &format!("{}.{}", path, i), out);
            }
        }
        _ => {}
    }
}

#[async_trait]
impl SecurityCheck for SensitiveDataCheck {
    fn name(&self) -> &str {
        "sensitive-data"
    }

    async fn execute(&self, exchange: &Exchange<'_>) -> anyhow::Result<Vec<RawFinding>> {
        let mut findings = Vec::new();

        let url = url::Url::parse(&exchange.endpoint.url)?;
        let leaked: Vec<String> = url
            .query_pairs()
            .filter(|(k, v)| !v.is_empty() && SECRET_KEY.is_match(k))
            .map(|(k, _)| k.into_owned())
            .collect();
        if !leaked.is_empty() {
            findings.push(
                RawFinding::new(
                    "credentials-in-url",
                    format!("Credentials passed in the query string: {}", leaked.join(", ")),
                )
                .severity(Severity::High)
                .location("query")
                .remediation("Send credentials in headers or the request body")
                .evidence(json!({ "parameters": leaked })),
            );
        }

        if let Some(body) = exchange.response.json_body() {
            let mut paths = Vec::new();
            collect_secret_paths(&body, "", &mut paths);
            if !paths.is_empty() {
                findings.push(
                    RawFinding::new(
                        "sensitive-data-exposure",
                        format!("Response body exposes secret-like fields: {}", paths.join(", ")),
                    )
                    .severity(Severity::High)
                    .location("body")
                    .remediation("Remove secrets from API responses or mask them")
                    .evidence(json!({ "fields": paths })),
                );
            }
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::Endpoint;
    use apiguard_http::{HttpMethod, HttpRequest, HttpResponse, HttpResponseBuilder, RequestBuilder};

    async fn run(check: &dyn SecurityCheck, url: &str, response: HttpResponse) -> Vec<RawFinding> {
        run_with_request(check, RequestBuilder::new(HttpMethod::Get, url).build(), response).await
    }

    async fn run_with_request(
        check: &dyn SecurityCheck,
        request: HttpRequest,
        response: HttpResponse,
    ) -> Vec<RawFinding> {
        let parsed = url::Url::parse(&request.url).unwrap();
        let endpoint = Endpoint::from_url(request.method, &parsed);
        let exchange = Exchange {
            request: &request,
            response: &response,
            endpoint: &endpoint,
        };
        check.execute(&exchange).await.unwrap()
    }

    fn types(findings: &[RawFinding]) -> Vec<&str> {
        findings
            .iter()
            .filter_map(|f| f.finding_type.as_deref())
            .collect()
    }

    #[tokio::test]
    async fn test_ssl_tls() {
        let plain = run(&SslTlsCheck, "http://127.0.0.1:8080/v1/users", HttpResponseBuilder::new().build()).await;
        assert_eq!(types(&plain), vec!["insecure-transport"]);

        let no_hsts = run(&SslTlsCheck, "https://api.example.com/v1/users", HttpResponseBuilder::new().build()).await;
        assert_eq!(types(&no_hsts), vec!["missing-hsts"]);

        let hardened = HttpResponseBuilder::new()
            .header("Strict-Transport-Security", "max-age=31536000")
            .build();
        assert!(run(&SslTlsCheck, "https://api.example.com/v1/users", hardened).await.is_empty());
    }

    #[tokio::test]
    async fn test_security_headers() {
        let check = SecurityHeadersCheck::default();
        let partial = HttpResponseBuilder::new()
            .header("X-Content-Type-Options", "nosniff")
            .header("X-Frame-Options", "DENY")
            .build();
        let findings = run(&check, "https://api.example.com/", partial).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].evidence, Some(json!({"header": "content-security-policy"})));

        let custom = SecurityHeadersCheck::from_config(
            &PluginConfig::enabled().with_option("headers", json!(["x-frame-options"])),
        )
        .unwrap();
        let findings = run(&custom, "https://api.example.com/", HttpResponseBuilder::new().build()).await;
        assert_eq!(findings.len(), 1);
    }

    #[tokio::test]
    async fn test_cors() {
        let wildcard = HttpResponseBuilder::new()
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Credentials", "true")
            .build();
        let findings = run(&CorsCheck, "https://api.example.com/", wildcard).await;
        assert_eq!(findings[0].severity, Some(Severity::High));

        let request = RequestBuilder::new(HttpMethod::Get, "https://api.example.com/")
            .header("Origin", "https://evil.example")
            .build();
        let reflected = HttpResponseBuilder::new()
            .header("Access-Control-Allow-Origin", "https://evil.example")
            .header("Access-Control-Allow-Credentials", "true")
            .build();
        let findings = run_with_request(&CorsCheck, request, reflected).await;
        assert_eq!(types(&findings), vec!["cors-misconfiguration"]);

        let strict = HttpResponseBuilder::new()
            .header("Access-Control-Allow-Origin", "https://app.example.com")
            .build();
        assert!(run(&CorsCheck, "https://api.example.com/", strict).await.is_empty());
    }

    #[tokio::test]
    async fn test_information_disclosure() {
        let leaky = HttpResponseBuilder::new()
            .status_code(500)
            .header("Server", "nginx/1.18.0")
            .header("X-Powered-By", "Express")
            .body("Traceback (most recent call last):\n  File \"app.py\", line 3")
            .build();
        let findings = run(&InformationDisclosureCheck, "https://api.example.com/", leaky).await;
        assert_eq!(
            types(&findings),
            vec!["information-disclosure", "information-disclosure", "verbose-error"]
        );

        let quiet = HttpResponseBuilder::new().header("Server", "nginx").build();
        assert!(run(&InformationDisclosureCheck, "https://api.example.com/", quiet).await.is_empty());
    }

    #[tokio::test]
    async fn test_sensitive_data() {
        let body = HttpResponseBuilder::new()
            .json(json!({"user": {"name": "Ann", "password": "hunter2"}, "items": [{"apiKey": "k"}]}))
            .build();
        let findings = run(
            &SensitiveDataCheck,
            "https://api.example.com/v1/users?token=abc&page=2",
            body,
        )
        .await;
        assert_eq!(types(&findings), vec!["credentials-in-url", "sensitive-data-exposure"]);
        let description = findings[1].description.as_deref().unwrap();
        assert!(description.contains("items.0.apiKey"));
        assert!(description.contains("user.password"));
    }
}
