//! Error types for scopecache-core
//!
//! [`ScopeCacheError`] wraps every crate's error so applications can use one
//! result type at the facade boundary.

use scopecache_batch::{BatchError, BatchFetchError};
use scopecache_key::KeyError;
use scopecache_query::QueryError;
use scopecache_reference::ReferenceError;
use std::path::PathBuf;

/// Result alias for facade operations
pub type ScopeCacheResult<T> = Result<T, ScopeCacheError>;

/// Umbrella error
#[derive(Debug, thiserror::Error)]
pub enum ScopeCacheError {
    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Key could not be built
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// Batcher could not be created
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),

    /// A batched fetch failed
    #[error(transparent)]
    BatchFetch(#[from] BatchFetchError),

    /// A query failed
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// A reference cache operation failed
    #[error("reference error: {0}")]
    Reference(#[from] ReferenceError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid TOML for the schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed
    #[error("invalid value for {var}: '{value}'")]
    Env {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },

    /// Batch thresholds are inconsistent
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// A setting is out of range
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_error_names_variable() {
        let err = ConfigError::Env {
            var: "SCOPECACHE_BATCH_SIZE",
            value: "many".to_string(),
        };
        assert_eq!(err.to_string(), "invalid value for SCOPECACHE_BATCH_SIZE: 'many'");
    }

    #[test]
    fn config_error_wraps_into_umbrella() {
        let err: ScopeCacheError = ConfigError::Invalid("max_capacity must be positive".into()).into();
        assert!(matches!(err, ScopeCacheError::Config(_)));
        assert_eq!(
            err.to_string(),
            "configuration error: invalid setting: max_capacity must be positive"
        );
    }
}
