//! Lifecycle hook kinds
//!
//! Hooks are registered per suite and run at fixed points:
//! - Suite-level: beforeAll, afterAll
//! - Test-level: beforeEach, afterEach

use serde::{Deserialize, Serialize};

/// Lifecycle points a hook can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookKind {
    /// Run once before the first test of a suite
    BeforeAll,
    /// Run once after the last test of a suite
    AfterAll,
    /// Run before each test
    BeforeEach,
    /// Run after each test, whether it passed or not
    AfterEach,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::BeforeAll => "beforeAll",
            HookKind::AfterAll => "afterAll",
            HookKind::BeforeEach => "beforeEach",
            HookKind::AfterEach => "afterEach",
        }
    }
}
