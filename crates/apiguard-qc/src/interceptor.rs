//! Request interception
//!
//! Every request a test makes goes through an [`Interceptor`]: the request is
//! sent on the underlying transport, then the exchange is handed to the
//! governance engine and the security scanner, their output is filed with
//! the collector under the calling test's labels, and the response is
//! returned untouched. Rule output never fails the request.

use crate::collector::ResultCollector;
use crate::governance::GovernanceEngine;
use crate::issue::{Endpoint, Exchange, IssueLabels};
use crate::security::SecurityScanner;
use apiguard_http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpResult, RequestBuilder,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// "Make a request, get `{status, headers, body, duration}` back"
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> HttpResult<HttpResponse>;
}

#[async_trait]
impl HttpTransport for HttpClient {
    async fn send(&self, request: &HttpRequest) -> HttpResult<HttpResponse> {
        self.execute(request).await
    }
}

/// Shared interception point for one run
pub struct Interceptor {
    transport: Arc<dyn HttpTransport>,
    governance: Arc<GovernanceEngine>,
    security: Arc<SecurityScanner>,
    collector: ResultCollector,
    base_url: Option<String>,
}

impl Interceptor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        governance: Arc<GovernanceEngine>,
        security: Arc<SecurityScanner>,
        collector: ResultCollector,
        base_url: Option<String>,
    ) -> Self {
        Self {
            transport,
            governance,
            security,
            collector,
            base_url,
        }
    }

    pub fn collector(&self) -> &ResultCollector {
        &self.collector
    }

    /// Send `request`, run both engines over the exchange, return the response
    pub async fn send(
        &self,
        mut request: HttpRequest,
        labels: &IssueLabels,
    ) -> HttpResult<HttpResponse> {
        let url = request.resolve_url(self.base_url.as_deref())?;
        // The query now lives in the absolute URL
        request.url = url.to_string();
        request.query.clear();

        let response = self.transport.send(&request).await?;

        let endpoint = Endpoint::from_url(request.method, &url);
        let exchange = Exchange {
            request: &request,
            response: &response,
            endpoint: &endpoint,
        };

        let violations = self.governance.check(&exchange, labels).await;
        let findings = self.security.scan(&exchange, labels).await;
        debug!(
            endpoint = %endpoint,
            status = response.status_code,
            violations = violations.len(),
            findings = findings.len(),
            suite = %labels.suite,
            test = %labels.test,
            "exchange inspected"
        );
        self.collector.add_violations(violations);
        self.collector.add_findings(findings);

        Ok(response)
    }
}

/// Request client handed to a test; bound to that test's labels
#[derive(Clone)]
pub struct RequestClient {
    inner: Arc<Interceptor>,
    labels: IssueLabels,
}

impl RequestClient {
    pub fn new(inner: Arc<Interceptor>, labels: IssueLabels) -> Self {
        Self { inner, labels }
    }

    pub fn labels(&self) -> &IssueLabels {
        &self.labels
    }

    /// Start building a request
    pub fn request(&self, method: HttpMethod, url: &str) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// Send a built request
    pub async fn send(&self, request: impl Into<HttpRequest>) -> HttpResult<HttpResponse> {
        self.inner.send(request.into(), &self.labels).await
    }

    pub async fn get(&self, url: &str) -> HttpResult<HttpResponse> {
        self.send(RequestBuilder::new(HttpMethod::Get, url)).await
    }

    pub async fn post(&self, url: &str, body: serde_json::Value) -> HttpResult<HttpResponse> {
        self.send(RequestBuilder::new(HttpMethod::Post, url).json_value(body))
            .await
    }

    pub async fn put(&self, url: &str, body: serde_json::Value) -> HttpResult<HttpResponse> {
        self.send(RequestBuilder::new(HttpMethod::Put, url).json_value(body))
            .await
    }

    pub async fn patch(&self, url: &str, body: serde_json::Value) -> HttpResult<HttpResponse> {
        self.send(RequestBuilder::new(HttpMethod::Patch, url).json_value(body))
            .await
    }

    pub async fn delete(&self, url: &str) -> HttpResult<HttpResponse> {
        self.send(RequestBuilder::new(HttpMethod::Delete, url)).await
    }
}

impl std::fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestClient")
            .field("labels", &self.labels)
            .field("base_url", &self.inner.base_url)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::governance::{GovernanceRule, RawViolation};
    use crate::security::{checks::SslTlsCheck, SecurityCheck};
    use apiguard_http::{HttpError, HttpResponseBuilder};
    use parking_lot::Mutex;

    /// Transport answering every request with a canned response
    pub(crate) struct StubTransport {
        pub response: HttpResponse,
        pub seen: Mutex<Vec<HttpRequest>>,
    }

    impl StubTransport {
        pub(crate) fn new(response: HttpResponse) -> Self {
            Self {
                response,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for StubTransport {
        async fn send(&self, request: &HttpRequest) -> HttpResult<HttpResponse> {
            self.seen.lock().push(request.clone());
            Ok(self.response.clone())
        }
    }

    struct Down;

    #[async_trait]
    impl HttpTransport for Down {
        async fn send(&self, _: &HttpRequest) -> HttpResult<HttpResponse> {
            Err(HttpError::Connection("connection refused".into()))
        }
    }

    struct AlwaysFlags;

    #[async_trait]
    impl GovernanceRule for AlwaysFlags {
        fn name(&self) -> &str {
            "always"
        }

        async fn validate(&self, _: &Exchange<'_>) -> anyhow::Result<Vec<RawViolation>> {
            Ok(vec![RawViolation::new("flagged")])
        }
    }

    fn interceptor(transport: Arc<dyn HttpTransport>) -> (Arc<Interceptor>, ResultCollector) {
        let mut governance = GovernanceEngine::new();
        governance.add_rule(Arc::new(AlwaysFlags));
        let mut security = SecurityScanner::new();
        security.add_check(Arc::new(SslTlsCheck) as Arc<dyn SecurityCheck>);
        let collector = ResultCollector::new();
        let interceptor = Interceptor::new(
            transport,
            Arc::new(governance),
            Arc::new(security),
            collector.clone(),
            Some("http://api.local".into()),
        );
        (Arc::new(interceptor), collector)
    }

    #[tokio::test]
    async fn test_issues_are_labelled_and_response_untouched() {
        let canned = HttpResponseBuilder::new()
            .status_code(418)
            .body("teapot")
            .build();
        let transport = Arc::new(StubTransport::new(canned.clone()));
        let (interceptor, collector) = interceptor(transport.clone());
        let client = RequestClient::new(interceptor, IssueLabels::new("Users", "lists"));

        let response = client
            .send(client.request(HttpMethod::Get, "/v1/users").query("page", "2"))
            .await
            .unwrap();
        assert_eq!(response, canned);

        let seen = transport.seen.lock();
        assert_eq!(seen[0].url, "http://api.local/v1/users?page=2");
        assert!(seen[0].query.is_empty());

        let results = collector.results();
        assert_eq!(results.governance.violations.len(), 1);
        let violation = &results.governance.violations[0];
        assert_eq!((violation.suite.as_str(), violation.test.as_str()), ("Users", "lists"));
        assert_eq!(violation.endpoint, "/v1/users");

        let finding = &results.security.findings[0];
        assert_eq!(finding.check, "ssl-tls");
        assert_eq!(finding.test, "lists");
    }

    #[tokio::test]
    async fn test_transport_errors_reach_the_test_without_issues() {
        let (interceptor, collector) = interceptor(Arc::new(Down));
        let client = RequestClient::new(interceptor, IssueLabels::new("s", "t"));

        let err = client.get("/v1/users").await.unwrap_err();
        assert!(matches!(err, HttpError::Connection(_)));
        assert!(collector.results().governance.violations.is_empty());
    }
}
