//! Per-test execution context

use crate::interceptor::{Interceptor, RequestClient};
use crate::issue::IssueLabels;
use anyhow::Context as _;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// Fixture bag shared by the hooks and body of one test
pub type Fixtures = Map<String, JsonValue>;

/// Context passed to every test body and hook.
///
/// A fresh context is built for each test attempt. Clones share the same
/// fixture bag, so values set in `beforeEach` are visible in the body and in
/// `afterEach`.
#[derive(Clone)]
pub struct TestContext {
    labels: IssueLabels,
    attempt: u32,
    fixtures: Arc<Mutex<Fixtures>>,
    client: RequestClient,
}

impl TestContext {
    pub(crate) fn new(
        interceptor: Arc<Interceptor>,
        labels: IssueLabels,
        seed: Fixtures,
        attempt: u32,
    ) -> Self {
        Self {
            client: RequestClient::new(interceptor, labels.clone()),
            labels,
            attempt,
            fixtures: Arc::new(Mutex::new(seed)),
        }
    }

    /// Qualified suite name
    pub fn suite(&self) -> &str {
        &self.labels.suite
    }

    /// Test name (the hook name for `beforeAll`/`afterAll`)
    pub fn test(&self) -> &str {
        &self.labels.test
    }

    /// 1-based attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Request client whose exchanges are checked and attributed to this test
    pub fn request(&self) -> &RequestClient {
        &self.client
    }

    /// Store a fixture
    pub fn set<V: Serialize>(&self, key: impl Into<String>, value: V) -> anyhow::Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .with_context(|| format!("fixture '{}' is not serializable", key))?;
        self.fixtures.lock().insert(key, value);
        Ok(())
    }

    /// Read a fixture; `None` when missing or of another shape
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let value = self.fixtures.lock().get(key).cloned()?;
        serde_json::from_value(value).ok()
    }

    /// Read a fixture that must be present
    pub fn require<V: DeserializeOwned>(&self, key: &str) -> anyhow::Result<V> {
        let value = self
            .fixtures
            .lock()
            .get(key)
            .cloned()
            .with_context(|| format!("fixture '{}' is not set", key))?;
        serde_json::from_value(value)
            .with_context(|| format!("fixture '{}' has an unexpected shape", key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fixtures.lock().contains_key(key)
    }

    /// Copy of the current fixture bag
    pub fn fixtures(&self) -> Fixtures {
        self.fixtures.lock().clone()
    }
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("suite", &self.labels.suite)
            .field("test", &self.labels.test)
            .field("attempt", &self.attempt)
            .finish()
    }
}
