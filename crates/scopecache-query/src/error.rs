//! Error types for queries

use scopecache_key::KeyError;

/// Errors surfaced by queries and the cache store
///
/// `Clone` so one failed fetch can be handed to every coalesced waiter and
/// every observer of the key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The transport (fetcher) failed; propagated unchanged
    #[error("transport error: {0}")]
    Transport(String),

    /// A cache slot held a value of another type
    #[error("cached value is not a {expected}")]
    TypeMismatch {
        /// Requested type name
        expected: &'static str,
    },

    /// Key construction failed for a reason other than "not ready"
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// Parameters or responses could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The fetch was discarded by a cache reset
    #[error("query cancelled by cache reset")]
    Cancelled,
}

impl QueryError {
    /// Transport error from any displayable cause
    #[inline]
    pub fn transport(cause: impl std::fmt::Display) -> Self {
        Self::Transport(cause.to_string())
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopecache_key::ScopeToken;

    #[test]
    fn transport_error_keeps_cause() {
        let err = QueryError::transport("connection refused");
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn key_error_converts() {
        let err: QueryError = KeyError::ScopeUnresolved {
            token: ScopeToken::Workspace,
        }
        .into();
        assert!(matches!(err, QueryError::Key(_)));
    }
}
