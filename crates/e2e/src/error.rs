//! Error types for E2E testing

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Unknown element '{0}': no locator registered under that name")]
    UnknownElement(String),

    #[error("Element '{name}' ({selector}) not found after {waited:?}")]
    ElementNotFound {
        name: String,
        selector: String,
        waited: Duration,
    },

    #[error("Element '{name}' ({selector}) is not visible or not enabled")]
    ElementNotInteractable { name: String, selector: String },

    #[error("Index {index} out of range for '{name}' ({len} element(s))")]
    IndexOutOfRange {
        name: String,
        index: usize,
        len: usize,
    },

    #[error("Collection '{0}' is empty")]
    EmptyCollection(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Timeout after {timeout:?} waiting for: {operation}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("Assertion failed: {message} (expected: {expected:?}, actual: {actual:?})")]
    AssertionFailed {
        message: String,
        expected: String,
        actual: String,
    },

    #[error("Ambiguous step '{step}' matches {patterns:?}")]
    PatternAmbiguity { step: String, patterns: Vec<String> },

    #[error("Undefined step: '{0}'")]
    UndefinedStep(String),

    #[error("Invalid step pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Step argument {index} is not {expected}: {value:?}")]
    ArgumentType {
        index: usize,
        expected: &'static str,
        value: String,
    },

    #[error("Feature parse error in {file}: {reason}")]
    FeatureParse { file: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Scenario aborted: {0}")]
    Aborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
}

impl E2eError {
    /// Errors that must stop the run before any scenario executes.
    pub fn is_load_time(&self) -> bool {
        matches!(
            self,
            E2eError::UnknownElement(_)
                | E2eError::PatternAmbiguity { .. }
                | E2eError::UndefinedStep(_)
                | E2eError::InvalidPattern { .. }
                | E2eError::FeatureParse { .. }
                | E2eError::Config(_)
                | E2eError::Glob(_)
                | E2eError::Toml(_)
        )
    }

    /// Whether this is a test verdict rather than an infrastructure failure.
    pub fn is_assertion(&self) -> bool {
        matches!(self, E2eError::AssertionFailed { .. })
    }

    /// Build an assertion failure from an expected/actual pair.
    pub fn assertion(
        message: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        E2eError::AssertionFailed {
            message: message.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
