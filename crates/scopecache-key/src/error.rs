//! Error types for key construction

use crate::scope::ScopeToken;

/// Errors raised while building a [`QueryKey`](crate::QueryKey)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// A required scope token has no current value
    #[error("scope {token} has no current value")]
    ScopeUnresolved { token: ScopeToken },

    /// The current grant scope is not among the query's required scopes
    #[error("grant scope {grant} is not one of {required:?}")]
    ScopeNotGranted {
        grant: ScopeToken,
        required: Vec<ScopeToken>,
    },

    /// The resolver requires a grant scope and none is known yet
    #[error("grant scope is not known yet")]
    GrantUnknown,

    /// The application context is still loading
    #[error("scope context is not ready")]
    NotReady,

    /// A query declared no scope tokens
    #[error("query declares no scope tokens")]
    NoScopes,

    /// A resource path segment is empty
    #[error("resource path segment '{0}' is empty")]
    EmptyPathSegment(&'static str),

    /// Parameters could not be converted to JSON
    #[error("failed to serialize key parameters: {0}")]
    Serialization(String),
}

impl KeyError {
    /// Whether the error means "not ready yet" rather than "broken"
    ///
    /// Callers suppress execution for these instead of reporting an error.
    #[inline]
    #[must_use]
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            Self::ScopeUnresolved { .. }
                | Self::ScopeNotGranted { .. }
                | Self::GrantUnknown
                | Self::NotReady
        )
    }
}

impl From<serde_json::Error> for KeyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_error_display() {
        let err = KeyError::ScopeUnresolved {
            token: ScopeToken::Workspace,
        };
        assert_eq!(err.to_string(), "scope WORKSPACE has no current value");
    }

    #[test]
    fn not_ready_classification() {
        assert!(KeyError::NotReady.is_not_ready());
        assert!(KeyError::GrantUnknown.is_not_ready());
        assert!(KeyError::ScopeUnresolved { token: ScopeToken::User }.is_not_ready());
        assert!(!KeyError::EmptyPathSegment("service").is_not_ready());
        assert!(!KeyError::Serialization("bad".into()).is_not_ready());
    }
}
