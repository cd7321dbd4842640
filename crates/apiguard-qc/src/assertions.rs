//! Assertion engine - expect-style assertions
//!
//! Every matcher evaluates its predicate, flips it when the expectation is
//! negated, and either returns the expectation again (so matchers chain with
//! `?`) or an [`AssertionError`] describing what went wrong.
//!
//! ```ignore
//! expect(response.status_code).to_be(200)?;
//! expect(body).to_have_property("user.email")?.not().to_be_null()?;
//! ```

use apiguard_http::{HttpResponse, HttpResponseLike};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use thiserror::Error;

/// Result type for assertions; `Ok` carries the expectation for chaining
pub type AssertionResult<'a, T> = Result<&'a Expectation<T>, AssertionError>;

/// Assertion error with context
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[error("{message}")]
pub struct AssertionError {
    /// Error message
    pub message: String,
    /// Expected value (stringified)
    pub expected: Option<String>,
    /// Actual value (stringified)
    pub actual: Option<String>,
    /// Matcher name (e.g., "to_equal", "to_have_property")
    pub assertion_type: String,
}

impl AssertionError {
    /// Create a new assertion error
    pub fn new(message: impl Into<String>, assertion_type: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expected: None,
            actual: None,
            assertion_type: assertion_type.into(),
        }
    }

    /// Add expected value
    pub fn with_expected(mut self, expected: impl fmt::Debug) -> Self {
        self.expected = Some(format!("{:?}", expected));
        self
    }

    /// Add actual value
    pub fn with_actual(mut self, actual: impl fmt::Debug) -> Self {
        self.actual = Some(format!("{:?}", actual));
        self
    }
}

/// Wrapped value plus negation flag
#[derive(Debug, Clone)]
pub struct Expectation<T> {
    value: T,
    negated: bool,
}

impl<T> Expectation<T> {
    /// Create a new expectation
    pub fn new(value: T) -> Self {
        Self {
            value,
            negated: false,
        }
    }

    /// A negated copy; `self` is left untouched so later chained calls on
    /// the original are not affected.
    pub fn not(&self) -> Self
    where
        T: Clone,
    {
        Self {
            value: self.value.clone(),
            negated: !self.negated,
        }
    }

    /// Get the value
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Check if negated
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    fn holds(&self, predicate: bool) -> bool {
        predicate != self.negated
    }

    /// "to" or "not to", for messages
    fn to(&self) -> &'static str {
        if self.negated {
            "not to"
        } else {
            "to"
        }
    }

    fn settle(
        &self,
        predicate: bool,
        error: impl FnOnce() -> AssertionError,
    ) -> AssertionResult<'_, T> {
        if self.holds(predicate) {
            Ok(self)
        } else {
            Err(error())
        }
    }
}

// =====================
// Equality and ordering
// =====================

impl<T: PartialEq + fmt::Debug> Expectation<T> {
    /// Assert the value equals `expected`
    pub fn to_be(&self, expected: T) -> AssertionResult<'_, T> {
        self.settle(self.value == expected, || {
            AssertionError::new(
                format!("Expected {:?} {} be {:?}", self.value, self.to(), expected),
                "to_be",
            )
            .with_expected(&expected)
            .with_actual(&self.value)
        })
    }

    /// Assert the value equals `expected` (by reference)
    pub fn to_equal(&self, expected: &T) -> AssertionResult<'_, T> {
        self.settle(self.value == *expected, || {
            AssertionError::new(
                format!("Expected {:?} {} equal {:?}", self.value, self.to(), expected),
                "to_equal",
            )
            .with_expected(expected)
            .with_actual(&self.value)
        })
    }

    /// Assert the value is one of `candidates`
    pub fn to_be_one_of(&self, candidates: &[T]) -> AssertionResult<'_, T> {
        self.settle(candidates.contains(&self.value), || {
            AssertionError::new(
                format!("Expected {:?} {} be one of {:?}", self.value, self.to(), candidates),
                "to_be_one_of",
            )
            .with_actual(&self.value)
        })
    }
}

impl<T: PartialOrd + fmt::Debug> Expectation<T> {
    pub fn to_be_greater_than(&self, expected: T) -> AssertionResult<'_, T> {
        self.settle(self.value > expected, || {
            AssertionError::new(
                format!("Expected {:?} {} be greater than {:?}", self.value, self.to(), expected),
                "to_be_greater_than",
            )
            .with_expected(&expected)
            .with_actual(&self.value)
        })
    }

    pub fn to_be_less_than(&self, expected: T) -> AssertionResult<'_, T> {
        self.settle(self.value < expected, || {
            AssertionError::new(
                format!("Expected {:?} {} be less than {:?}", self.value, self.to(), expected),
                "to_be_less_than",
            )
            .with_expected(&expected)
            .with_actual(&self.value)
        })
    }

    pub fn to_be_at_least(&self, expected: T) -> AssertionResult<'_, T> {
        self.settle(self.value >= expected, || {
            AssertionError::new(
                format!("Expected {:?} {} be at least {:?}", self.value, self.to(), expected),
                "to_be_at_least",
            )
            .with_expected(&expected)
            .with_actual(&self.value)
        })
    }

    pub fn to_be_at_most(&self, expected: T) -> AssertionResult<'_, T> {
        self.settle(self.value <= expected, || {
            AssertionError::new(
                format!("Expected {:?} {} be at most {:?}", self.value, self.to(), expected),
                "to_be_at_most",
            )
            .with_expected(&expected)
            .with_actual(&self.value)
        })
    }

    /// Inclusive range check
    pub fn to_be_between(&self, low: T, high: T) -> AssertionResult<'_, T> {
        let inside = self.value >= low && self.value <= high;
        self.settle(inside, || {
            AssertionError::new(
                format!(
                    "Expected {:?} {} be between {:?} and {:?}",
                    self.value,
                    self.to(),
                    low,
                    high
                ),
                "to_be_between",
            )
            .with_actual(&self.value)
        })
    }
}

// =====================
// Boolean / Option
// =====================

impl Expectation<bool> {
    pub fn to_be_true(&self) -> AssertionResult<'_, bool> {
        self.settle(self.value, || {
            AssertionError::new(
                format!("Expected value {} be true", self.to()),
                "to_be_true",
            )
            .with_actual(self.value)
        })
    }

    pub fn to_be_false(&self) -> AssertionResult<'_, bool> {
        self.settle(!self.value, || {
            AssertionError::new(
                format!("Expected value {} be false", self.to()),
                "to_be_false",
            )
            .with_actual(self.value)
        })
    }
}

impl<T: fmt::Debug> Expectation<Option<T>> {
    pub fn to_be_some(&self) -> AssertionResult<'_, Option<T>> {
        self.settle(self.value.is_some(), || {
            AssertionError::new(
                format!("Expected {:?} {} be Some", self.value, self.to()),
                "to_be_some",
            )
        })
    }

    pub fn to_be_none(&self) -> AssertionResult<'_, Option<T>> {
        self.settle(self.value.is_none(), || {
            AssertionError::new(
                format!("Expected {:?} {} be None", self.value, self.to()),
                "to_be_none",
            )
        })
    }
}

// =====================
// Strings
// =====================

fn compile(pattern: &str) -> Result<Regex, AssertionError> {
    Regex::new(pattern)
        .map_err(|e| AssertionError::new(format!("Invalid regex pattern: {}", e), "to_match"))
}

impl Expectation<String> {
    pub fn to_contain(&self, substring: &str) -> AssertionResult<'_, String> {
        self.settle(self.value.contains(substring), || {
            AssertionError::new(
                format!("Expected {:?} {} contain {:?}", self.value, self.to(), substring),
                "to_contain",
            )
            .with_expected(substring)
            .with_actual(&self.value)
        })
    }

    pub fn to_start_with(&self, prefix: &str) -> AssertionResult<'_, String> {
        self.settle(self.value.starts_with(prefix), || {
            AssertionError::new(
                format!("Expected {:?} {} start with {:?}", self.value, self.to(), prefix),
                "to_start_with",
            )
        })
    }

    pub fn to_match(&self, pattern: &str) -> AssertionResult<'_, String> {
        let regex = compile(pattern)?;
        self.settle(regex.is_match(&self.value), || {
            AssertionError::new(
                format!("Expected {:?} {} match {:?}", self.value, self.to(), pattern),
                "to_match",
            )
        })
    }

    pub fn to_have_length(&self, length: usize) -> AssertionResult<'_, String> {
        let actual = self.value.chars().count();
        self.settle(actual == length, || {
            AssertionError::new(
                format!("Expected length {} {} be {}", actual, self.to(), length),
                "to_have_length",
            )
            .with_expected(length)
            .with_actual(actual)
        })
    }
}

impl<'s> Expectation<&'s str> {
    pub fn to_contain(&self, substring: &str) -> AssertionResult<'_, &'s str> {
        self.settle(self.value.contains(substring), || {
            AssertionError::new(
                format!("Expected {:?} {} contain {:?}", self.value, self.to(), substring),
                "to_contain",
            )
        })
    }

    pub fn to_match(&self, pattern: &str) -> AssertionResult<'_, &'s str> {
        let regex = compile(pattern)?;
        self.settle(regex.is_match(self.value), || {
            AssertionError::new(
                format!("Expected {:?} {} match {:?}", self.value, self.to(), pattern),
                "to_match",
            )
        })
    }
}

// =====================
// Collections
// =====================

impl<T: PartialEq + fmt::Debug> Expectation<Vec<T>> {
    pub fn to_contain_item(&self, item: &T) -> AssertionResult<'_, Vec<T>> {
        self.settle(self.value.contains(item), || {
            AssertionError::new(
                format!("Expected collection {} contain {:?}", self.to(), item),
                "to_contain_item",
            )
            .with_expected(item)
        })
    }

    pub fn to_have_length(&self, length: usize) -> AssertionResult<'_, Vec<T>> {
        let actual = self.value.len();
        self.settle(actual == length, || {
            AssertionError::new(
                format!("Expected collection length {} {} be {}", actual, self.to(), length),
                "to_have_length",
            )
        })
    }

    pub fn to_be_empty(&self) -> AssertionResult<'_, Vec<T>> {
        self.settle(self.value.is_empty(), || {
            AssertionError::new(
                format!("Expected collection {} be empty", self.to()),
                "to_be_empty",
            )
        })
    }
}

// =====================
// JSON
// =====================

/// Outcome of walking a dotted path
enum PathLookup<'a> {
    Found(&'a JsonValue),
    /// Prefix of the path up to and including the first missing segment
    Missing(String),
}

fn walk<'a>(value: &'a JsonValue, path: &str) -> PathLookup<'a> {
    let mut current = value;
    let mut walked: Vec<&str> = Vec::new();

    for segment in path.split('.') {
        walked.push(segment);
        let next = match current {
            JsonValue::Object(map) => map.get(segment),
            JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return PathLookup::Missing(walked.join(".")),
        }
    }

    PathLookup::Found(current)
}

/// Look up a dotted path (`"data.items.0.id"`) inside a JSON value
pub fn json_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    match walk(value, path) {
        PathLookup::Found(v) => Some(v),
        PathLookup::Missing(_) => None,
    }
}

impl Expectation<JsonValue> {
    /// Assert a dotted property path exists
    pub fn to_have_property(&self, path: &str) -> AssertionResult<'_, JsonValue> {
        match walk(&self.value, path) {
            PathLookup::Found(_) => self.settle(true, || {
                AssertionError::new(
                    format!("Expected property '{}' not to exist", path),
                    "to_have_property",
                )
            }),
            PathLookup::Missing(sub_path) => self.settle(false, || {
                AssertionError::new(
                    format!("Property '{}' not found", sub_path),
                    "to_have_property",
                )
                .with_expected(path)
            }),
        }
    }

    /// Assert a dotted property path exists and holds `expected`
    pub fn to_have_property_value(
        &self,
        path: &str,
        expected: &JsonValue,
    ) -> AssertionResult<'_, JsonValue> {
        match walk(&self.value, path) {
            PathLookup::Missing(sub_path) if !self.negated => Err(AssertionError::new(
                format!("Property '{}' not found", sub_path),
                "to_have_property",
            )
            .with_expected(path)),
            PathLookup::Missing(_) => Ok(self),
            PathLookup::Found(actual) => self.settle(actual == expected, || {
                AssertionError::new(
                    format!(
                        "Expected property '{}' {} equal {}, got {}",
                        path,
                        self.to(),
                        expected,
                        actual
                    ),
                    "to_have_property",
                )
                .with_expected(expected)
                .with_actual(actual)
            }),
        }
    }

    pub fn to_be_null(&self) -> AssertionResult<'_, JsonValue> {
        self.settle(self.value.is_null(), || {
            AssertionError::new(
                format!("Expected {} {} be null", self.value, self.to()),
                "to_be_null",
            )
        })
    }

    /// Arrays contain an element, strings contain a substring, objects contain a key
    pub fn to_contain(&self, needle: &JsonValue) -> AssertionResult<'_, JsonValue> {
        let found = match (&self.value, needle) {
            (JsonValue::Array(items), _) => items.contains(needle),
            (JsonValue::String(s), JsonValue::String(sub)) => s.contains(sub.as_str()),
            (JsonValue::Object(map), JsonValue::String(key)) => map.contains_key(key),
            _ => false,
        };
        self.settle(found, || {
            AssertionError::new(
                format!("Expected {} {} contain {}", self.value, self.to(), needle),
                "to_contain",
            )
        })
    }
}

// =====================
// HTTP responses
// =====================

impl<'r> Expectation<&'r HttpResponse> {
    pub fn to_have_status(&self, status: u16) -> AssertionResult<'_, &'r HttpResponse> {
        self.settle(self.value.status_code == status, || {
            AssertionError::new(
                format!(
                    "Expected status {} {} be {}",
                    self.value.status_code,
                    self.to(),
                    status
                ),
                "to_have_status",
            )
            .with_expected(status)
            .with_actual(self.value.status_code)
        })
    }

    pub fn to_be_success(&self) -> AssertionResult<'_, &'r HttpResponse> {
        self.settle(self.value.is_success(), || {
            AssertionError::new(
                format!("Expected status {} {} be 2xx", self.value.status_code, self.to()),
                "to_be_success",
            )
        })
    }

    /// Header present (case-insensitive), optionally with an exact value
    pub fn to_have_header(
        &self,
        name: &str,
        value: Option<&str>,
    ) -> AssertionResult<'_, &'r HttpResponse> {
        let actual = self.value.header(name);
        let present = match (actual, value) {
            (Some(a), Some(v)) => a == v,
            (Some(_), None) => true,
            (None, _) => false,
        };
        self.settle(present, || {
            let wanted = value.map(|v| format!(" = {:?}", v)).unwrap_or_default();
            AssertionError::new(
                format!("Expected header '{}'{} {} be present", name, wanted, self.to()),
                "to_have_header",
            )
            .with_actual(actual)
        })
    }
}

/// Create an expectation
pub fn expect<T>(value: T) -> Expectation<T> {
    Expectation::new(value)
}
