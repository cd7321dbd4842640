//! HTTP client with connection pooling and async operations

use crate::config::HttpClientConfig;
use crate::error::HttpResult;
use crate::request::{HttpRequest, RequestBuilder};
use crate::response::{from_reqwest, HttpResponse};
use apiguard_common::http::HttpMethod;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Async HTTP client with connection pooling
///
/// # Example
///
/// ```ignore
/// use apiguard_http::{HttpClient, HttpClientConfig};
///
/// let client = HttpClient::new(HttpClientConfig::new().base_url("https://api.example.com"))?;
/// let response = client.get("/v1/users/1").await?;
/// println!("Status: {}, took {}ms", response.status_code, response.duration_ms);
/// ```
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<HttpClientInner>,
}

struct HttpClientInner {
    client: reqwest::Client,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: HttpClientConfig) -> HttpResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent);

        if config.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        if config.danger_accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build()?;

        Ok(Self {
            inner: Arc::new(HttpClientInner { client, config }),
        })
    }

    /// Create a client with default configuration
    pub fn default_client() -> HttpResult<Self> {
        Self::new(HttpClientConfig::default())
    }

    /// Get the base URL
    pub fn base_url(&self) -> Option<&str> {
        self.inner.config.base_url.as_deref()
    }

    /// Send a request and measure its round trip
    pub async fn execute(&self, request: &HttpRequest) -> HttpResult<HttpResponse> {
        let url = request.resolve_url(self.base_url())?;
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| crate::error::HttpError::InvalidRequest(e.to_string()))?;

        let mut builder = self.inner.client.request(method, url.clone());
        for (name, value) in &self.inner.config.default_headers {
            builder = builder.header(name, value);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let start = Instant::now();
        let response = builder.send().await?;
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            method = %request.method,
            url = %url,
            status = response.status().as_u16(),
            duration_ms,
            "HTTP exchange complete"
        );

        from_reqwest(response, duration_ms).await
    }

    /// Build and send a request
    pub async fn execute_builder(&self, builder: RequestBuilder) -> HttpResult<HttpResponse> {
        self.execute(&builder.build()).await
    }

    /// Send a GET request
    pub async fn get(&self, url: &str) -> HttpResult<HttpResponse> {
        self.execute_builder(RequestBuilder::new(HttpMethod::Get, url))
            .await
    }

    /// Send a POST request with JSON body
    pub async fn post(&self, url: &str, body: serde_json::Value) -> HttpResult<HttpResponse> {
        self.execute_builder(RequestBuilder::new(HttpMethod::Post, url).json_value(body))
            .await
    }

    /// Send a DELETE request
    pub async fn delete(&self, url: &str) -> HttpResult<HttpResponse> {
        self.execute_builder(RequestBuilder::new(HttpMethod::Delete, url))
            .await
    }

    /// Create a request builder for more complex requests
    pub fn request(&self, method: HttpMethod, url: &str) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.inner.config.base_url)
            .field("timeout", &self.inner.config.timeout)
            .finish()
    }
}
