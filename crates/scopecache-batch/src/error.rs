//! Error types for id batching

/// Errors raised while constructing or configuring a batcher
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    /// Thresholds are inconsistent
    #[error("invalid batch configuration: {0}")]
    InvalidConfig(String),

    /// No tokio runtime was available to drive timers
    #[error("no tokio runtime available for batch timers")]
    NoRuntime,
}

/// A batched fetch failed
///
/// Cloned to every holder that was waiting on the batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("batch fetch failed: {message}")]
pub struct BatchFetchError {
    /// Human-readable cause
    pub message: String,
}

impl BatchFetchError {
    /// Create from any displayable cause
    #[inline]
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}
