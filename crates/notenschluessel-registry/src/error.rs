//! Error types for registry operations.

/// Error type for registry operations.
///
/// Lookups never fail: a missing or expired key is reported as `None`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The OS random source could not produce a session identifier.
    #[error("Entropy source failed: {0}")]
    Entropy(String),

    /// A reaper was requested outside of a tokio runtime.
    #[error("No tokio runtime available to run the reaper")]
    NoRuntime,

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;
