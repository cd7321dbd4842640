//! Request description and builder

use crate::error::{HttpError, HttpResult};
use apiguard_common::http::{HttpMethod, HttpRequestLike};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// A fully described HTTP request.
///
/// This is the value handed to the transport and, unchanged, to every
/// governance rule and security check that inspects the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL or a path relative to the client's base URL
    pub url: String,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Query parameters in insertion order
    pub query: Vec<(String, String)>,
    /// Serialized body
    pub body: Option<Vec<u8>>,
    /// Per-request timeout overriding the client default
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Resolve the request URL against an optional base URL and append the
    /// query parameters.
    pub fn resolve_url(&self, base_url: Option<&str>) -> HttpResult<Url> {
        let raw = if is_absolute(&self.url) {
            self.url.clone()
        } else {
            match base_url {
                Some(base) => join_url(base, &self.url),
                None => {
                    return Err(HttpError::InvalidUrl(format!(
                        "relative URL '{}' requires a base URL",
                        self.url
                    )))
                }
            }
        };

        let mut url = Url::parse(&raw)?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Body decoded as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }
}

impl HttpRequestLike for HttpRequest {
    fn method(&self) -> HttpMethod {
        self.method
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Fluent builder for [`HttpRequest`]
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl RequestBuilder {
    /// Start a request for the given method and URL
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Set a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set `Authorization: Bearer <token>`
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("authorization", value)
    }

    /// Set a JSON body from an already-built value
    pub fn json_value(mut self, value: serde_json::Value) -> Self {
        self.body = Some(value.to_string().into_bytes());
        self.headers
            .entry("content-type".to_string())
            .or_insert_with(|| "application/json".to_string());
        self
    }

    /// Serialize any value as the JSON body
    pub fn json<T: Serialize>(self, value: &T) -> HttpResult<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| HttpError::Json(format!("Failed to serialize body: {}", e)))?;
        Ok(self.json_value(value))
    }

    /// Set a plain-text body
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(text.into().into_bytes());
        self.headers
            .entry("content-type".to_string())
            .or_insert_with(|| "text/plain".to_string());
        self
    }

    /// Set a raw body
    pub fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.body = Some(bytes);
        self
    }

    /// Override the client timeout for this request
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Finish building
    pub fn build(self) -> HttpRequest {
        HttpRequest {
            method: self.method,
            url: self.url,
            headers: self.headers,
            query: self.query,
            body: self.body,
            timeout: self.timeout,
        }
    }
}

impl From<RequestBuilder> for HttpRequest {
    fn from(builder: RequestBuilder) -> Self {
        builder.build()
    }
}
