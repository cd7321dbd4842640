//! apiguard-http: async HTTP transport
//!
//! The transport used by apiguard test contexts. It owns connection pooling
//! and latency measurement; everything above it (rule engines, collectors)
//! only sees the request that was sent and the `{status, headers, body,
//! latency}` that came back.
//!
//! # Architecture
//!
//! - `HttpClient`: Connection-pooled async HTTP client
//! - `RequestBuilder` / `HttpRequest`: Request description with headers, query and body
//! - `HttpResponse`: Response wrapper with latency measurement

pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod response;

pub use client::HttpClient;
pub use config::HttpClientConfig;
pub use error::{HttpError, HttpResult};
pub use request::{HttpRequest, RequestBuilder};
pub use response::{HttpResponse, HttpResponseBuilder};

// Re-export shared HTTP types from apiguard-common
pub use apiguard_common::http::{HttpMethod, HttpStatus, HttpResponseLike, HttpRequestLike};
