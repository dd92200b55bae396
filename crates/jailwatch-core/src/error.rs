//! Error types for jailwatch-core.
//!
//! Startup errors only: everything here is raised while loading the
//! configuration or the node descriptor, before any scenario runs.

/// Result type alias for harness setup operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors raised while preparing a harness run.
///
/// All variants are fatal. A broken configuration or descriptor means the
/// test environment itself is unusable.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Node descriptor missing or malformed.
    #[error("descriptor error: {0}")]
    Descriptor(String),
}

impl HarnessError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a descriptor error.
    #[must_use]
    pub fn descriptor(msg: impl Into<String>) -> Self {
        Self::Descriptor(msg.into())
    }
}
