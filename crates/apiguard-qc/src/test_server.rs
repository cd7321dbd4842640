//! Stub API server for end-to-end runs
//!
//! A small axum server with canned responses keyed by `METHOD path`. Suites
//! can be pointed at it to exercise the full request/rule pipeline without
//! a real backend. Unknown routes answer 404 with a JSON error body.

use axum::{
    extract::State,
    http::{HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::debug;

/// Canned response for one route
#[derive(Debug, Clone)]
pub struct StubRoute {
    pub status: u16,
    pub body: JsonValue,
    pub headers: Vec<(String, String)>,
    /// Delay before answering, in milliseconds
    pub delay_ms: u64,
}

impl Default for StubRoute {
    fn default() -> Self {
        Self {
            status: 200,
            body: JsonValue::Object(serde_json::Map::new()),
            headers: Vec::new(),
            delay_ms: 0,
        }
    }
}

impl StubRoute {
    pub fn new(status: u16, body: JsonValue) -> Self {
        Self {
            status,
            body,
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

#[derive(Clone)]
struct ServerState {
    routes: Arc<HashMap<String, StubRoute>>,
}

fn route_key(method: &str, path: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), path)
}

/// Builder for a stub server
#[derive(Debug, Default)]
pub struct TestServer {
    routes: HashMap<String, StubRoute>,
    port: Option<u16>,
}

impl TestServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Port to listen on (default: auto-select)
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Add a route with full configuration
    pub fn route(mut self, method: &str, path: &str, route: StubRoute) -> Self {
        self.routes.insert(route_key(method, path), route);
        self
    }

    /// Add a GET route answering 200 with `body`
    pub fn get(self, path: &str, body: JsonValue) -> Self {
        self.route("GET", path, StubRoute::new(200, body))
    }

    /// Add a POST route answering `status` with `body`
    pub fn post(self, path: &str, status: u16, body: JsonValue) -> Self {
        self.route("POST", path, StubRoute::new(status, body))
    }

    /// Add a DELETE route answering `status` with an empty object
    pub fn delete(self, path: &str, status: u16) -> Self {
        self.route("DELETE", path, StubRoute::new(status, json!({})))
    }

    /// Bind and serve in the background
    pub async fn start(self) -> anyhow::Result<TestServerHandle> {
        let state = ServerState {
            routes: Arc::new(self.routes),
        };
        let app = Router::new().fallback(handle_request).with_state(state);

        let addr = match self.port {
            Some(port) => format!("127.0.0.1:{}", port),
            None => "127.0.0.1:0".to_string(),
        };
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        let url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });
        debug!(url = %url, "stub server listening");

        Ok(TestServerHandle {
            url,
            port,
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

async fn handle_request(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
) -> Response {
    let Some(route) = state.routes.get(&route_key(method.as_str(), uri.path())) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": "NOT_FOUND", "message": "no such route" } })),
        )
            .into_response();
    };

    if route.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(route.delay_ms)).await;
    }

    let status = StatusCode::from_u16(route.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = if status == StatusCode::NO_CONTENT {
        status.into_response()
    } else {
        (status, Json(route.body.clone())).into_response()
    };
    for (name, value) in &route.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

/// Handle for a running stub server; stops the server when dropped
pub struct TestServerHandle {
    /// Base URL, e.g. `http://127.0.0.1:8765`
    pub url: String,
    pub port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServerHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
