//! Scenario error types.

use std::time::Duration;

use jailwatch_core::{FaultError, HarnessError, StateError};

/// Result type alias for scenario operations.
pub type Result<T> = std::result::Result<T, TestError>;

/// Terminal scenario failures.
///
/// Transient conditions never reach this type: they are absorbed where
/// they occur. Anything that does is fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// A polling loop ran out of time.
    #[error("timeout after {waited:?} waiting for {description}")]
    Timeout {
        /// What was being waited for.
        description: String,
        /// Time spent waiting.
        waited: Duration,
    },

    /// Environment precondition or post-condition violated.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// Chain state endpoint error.
    #[error("state endpoint error: {0}")]
    State(#[from] StateError),

    /// Container runtime error.
    #[error("fault injection error: {0}")]
    Fault(#[from] FaultError),

    /// Configuration or descriptor error.
    #[error("setup error: {0}")]
    Harness(#[from] HarnessError),
}

impl TestError {
    /// Creates an assertion error.
    #[must_use]
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(description: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            description: description.into(),
            waited,
        }
    }

    /// Returns true if this is a polling timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assertion_error() {
        let err = TestError::assertion("jail_chain1_1 still running after kill");
        assert!(err.to_string().contains("assertion failed"));
        assert!(err.to_string().contains("jail_chain1_1"));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_timeout_error() {
        let err = TestError::timeout("validator count == 1", Duration::from_secs(3600));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("3600"));
        assert!(err.to_string().contains("validator count == 1"));
    }

    #[test]
    fn test_state_error_conversion() {
        let err: TestError = StateError::rpc(-32000, "boom").into();
        assert!(err.to_string().contains("state endpoint error"));
    }

    #[test]
    fn test_fault_error_conversion() {
        let err: TestError = FaultError::NotFound("jail_chain1_1".into()).into();
        assert!(err.to_string().contains("fault injection error"));
    }

    #[test]
    fn test_harness_error_conversion() {
        let err: TestError = HarnessError::config("bad").into();
        assert!(err.to_string().contains("setup error"));
    }
}
