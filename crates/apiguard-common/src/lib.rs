//! Common types for apiguard
//!
//! This crate provides the HTTP vocabulary shared by the transport crate and
//! the test-orchestration core.

pub mod http;

pub use http::{HttpMethod, HttpStatus, HttpRequestLike, HttpResponseLike};
