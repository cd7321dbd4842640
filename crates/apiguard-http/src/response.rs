//! HTTP response types

use crate::error::{HttpError, HttpResult};
use apiguard_common::http::HttpResponseLike;
use std::collections::HashMap;
use std::time::Duration;

/// HTTP response with the measured round-trip duration
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status_code: u16,

    /// Response headers (names lowercased by the transport)
    pub headers: HashMap<String, String>,

    /// Response body as bytes
    pub body: Vec<u8>,

    /// Round-trip duration in milliseconds
    pub duration_ms: u64,

    /// Final URL
    pub url: String,

    /// HTTP version
    pub version: String,
}

impl HttpResponse {
    /// Get body as text (UTF-8)
    pub fn text(&self) -> HttpResult<String> {
        String::from_utf8(self.body.clone())
            .map_err(|e| HttpError::Response(format!("Invalid UTF-8 in response: {}", e)))
    }

    /// Get body as JSON
    pub fn json(&self) -> HttpResult<serde_json::Value> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::Json(format!("Failed to parse JSON: {}", e)))
    }

    /// Get body as JSON and deserialize to type
    pub fn json_as<T: serde::de::DeserializeOwned>(&self) -> HttpResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::Json(format!("Failed to deserialize JSON: {}", e)))
    }

    /// Body as JSON when it parses, `None` otherwise
    pub fn json_body(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Get duration as `Duration`
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Check if content type is JSON
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("json"))
            .unwrap_or(false)
    }
}

impl HttpResponseLike for HttpResponse {
    fn status_code(&self) -> u16 {
        self.status_code
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    fn body_bytes(&self) -> &[u8] {
        &self.body
    }
}

/// Builder for [`HttpResponse`], used by fake transports in tests
#[derive(Debug)]
pub struct HttpResponseBuilder {
    response: HttpResponse,
}

impl HttpResponseBuilder {
    pub fn new() -> Self {
        Self {
            response: HttpResponse {
                status_code: 200,
                headers: HashMap::new(),
                body: Vec::new(),
                duration_ms: 0,
                url: String::new(),
                version: "HTTP/1.1".to_string(),
            },
        }
    }

    pub fn status_code(mut self, code: u16) -> Self {
        self.response.status_code = code;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response
            .headers
            .insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.response.body = body.into();
        self
    }

    /// JSON body plus matching content type
    pub fn json(self, value: serde_json::Value) -> Self {
        self.header("content-type", "application/json")
            .body(value.to_string())
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.response.duration_ms = ms;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.response.url = url.into();
        self
    }

    pub fn build(self) -> HttpResponse {
        self.response
    }
}

impl Default for HttpResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a reqwest response into an [`HttpResponse`]
pub(crate) async fn from_reqwest(
    response: reqwest::Response,
    duration_ms: u64,
) -> HttpResult<HttpResponse> {
    let status_code = response.status().as_u16();
    let url = response.url().to_string();
    let version = format!("{:?}", response.version());

    let mut headers = HashMap::new();
    for (name, value) in response.headers().iter() {
        if let Ok(v) = value.to_str() {
            headers.insert(name.as_str().to_lowercase(), v.to_string());
        }
    }

    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
        duration_ms,
        url,
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status_checks() {
        let response = HttpResponseBuilder::new().status_code(200).build();
        assert!(response.is_success());

        let response = HttpResponseBuilder::new().status_code(404).build();
        assert!(!response.is_success());
        assert!(response.status().is_client_error());
    }

    #[test]
    fn test_response_json() {
        let response = HttpResponseBuilder::new()
            .json(serde_json::json!({"name": "Alice", "age": 30}))
            .build();

        assert!(response.is_json());
        let json = response.json().unwrap();
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["age"], 30);
    }

    #[test]
    fn test_json_body_on_text_is_none() {
        let response = HttpResponseBuilder::new().body("plain").build();
        assert!(response.json_body().is_none());
        assert_eq!(response.text().unwrap(), "plain");
    }

    #[test]
    fn test_response_header_case_insensitive() {
        let response = HttpResponseBuilder::new()
            .header("Content-Type", "application/json; charset=utf-8")
            .build();

        assert_eq!(
            response.header("CONTENT-TYPE"),
            Some("application/json; charset=utf-8")
        );
        assert!(response.is_json());
    }
}
