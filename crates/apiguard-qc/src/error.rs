//! Error taxonomy for registration, configuration, engine loading and test execution

use crate::hooks::HookKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Registration-time (DSL) errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DslError {
    /// `test` or a hook registrar was called with no `describe` on the stack
    #[error("`{registrar}` must be called inside a describe block")]
    OutsideDescribe { registrar: &'static str },

    #[error("suite name must not be empty")]
    EmptySuiteName,

    #[error("test name must not be empty (suite '{suite}')")]
    EmptyTestName { suite: String },
}

/// Result type for DSL registration
pub type DslResult<T> = Result<T, DslError>;

/// Malformed or unreadable run configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format} config: {message}")]
    Parse { format: &'static str, message: String },

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures while loading governance rules or security checks
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown governance rule '{0}'")]
    UnknownRule(String),

    #[error("unknown security check '{0}'")]
    UnknownCheck(String),

    #[error("failed to construct '{name}': {message}")]
    Factory { name: String, message: String },

    #[error("'{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Anything that stops a run before the first suite executes
#[derive(Error, Debug)]
pub enum QcError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Dsl(#[from] DslError),

    #[error(transparent)]
    Http(#[from] apiguard_http::HttpError),
}

/// How a test failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Assertion,
    Timeout,
    Error,
    Hook,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Assertion => write!(f, "assertion"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Error => write!(f, "error"),
            FailureKind::Hook => write!(f, "hook"),
        }
    }
}

/// A single failed attempt of a test body or hook
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TestFailure {
    #[error("{0}")]
    Assertion(String),

    #[error("Test timed out after {0}ms")]
    Timeout(u64),

    #[error("{0}")]
    Error(String),

    #[error("panicked: {0}")]
    Panic(String),

    #[error("{hook} hook failed: {message}")]
    Hook { hook: HookKind, message: String },
}

impl TestFailure {
    /// Classify an error returned from a test body
    pub fn from_error(err: anyhow::Error) -> Self {
        if let Some(assertion) = err.downcast_ref::<crate::assertions::AssertionError>() {
            return TestFailure::Assertion(assertion.to_string());
        }
        if let Some(http) = err.downcast_ref::<apiguard_http::HttpError>() {
            return TestFailure::Error(http.sanitized_message());
        }
        TestFailure::Error(format!("{:#}", err))
    }

    /// Kind reported alongside the test result
    pub fn kind(&self) -> FailureKind {
        match self {
            TestFailure::Assertion(_) => FailureKind::Assertion,
            TestFailure::Timeout(_) => FailureKind::Timeout,
            TestFailure::Error(_) | TestFailure::Panic(_) => FailureKind::Error,
            TestFailure::Hook { .. } => FailureKind::Hook,
        }
    }

    /// Whether another attempt may be made under the test's retry budget
    pub fn is_retryable(&self, retry_on_timeout: bool) -> bool {
        match self {
            TestFailure::Timeout(_) => retry_on_timeout,
            TestFailure::Hook { .. } => false,
            _ => true,
        }
    }

    /// Re-label a body failure as a failure of the given hook
    pub fn into_hook(self, hook: HookKind) -> Self {
        match self {
            TestFailure::Hook { .. } => self,
            other => TestFailure::Hook {
                hook,
                message: other.to_string(),
            },
        }
    }
}
