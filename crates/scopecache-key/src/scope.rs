//! Scope tokens and the resolver that maps them to runtime identifiers
//!
//! A [`ScopeToken`] names a tenancy context (domain, workspace, user). The
//! concrete value behind a token is owned by the application and looked up
//! through a [`ScopeResolver`] every time a key is built.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Tenancy context a query can depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeToken {
    /// Current domain (tenant)
    Domain,
    /// Current workspace inside the domain
    Workspace,
    /// Signed-in user
    User,
}

impl ScopeToken {
    /// All tokens in declaration order
    pub const ALL: [ScopeToken; 3] = [Self::Domain, Self::Workspace, Self::User];

    /// Upper-case wire name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Domain => "DOMAIN",
            Self::Workspace => "WORKSPACE",
            Self::User => "USER",
        }
    }
}

impl Display for ScopeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeToken {
    type Err = UnknownScopeToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DOMAIN" => Ok(Self::Domain),
            "WORKSPACE" => Ok(Self::Workspace),
            "USER" => Ok(Self::User),
            _ => Err(UnknownScopeToken(s.to_string())),
        }
    }
}

/// Returned when parsing an unrecognised scope name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scope token: '{0}'")]
pub struct UnknownScopeToken(pub String);

/// Source of the current value for each scope token
///
/// Implementations are owned by the application (session, router, store) and
/// must be cheap to call: keys are rebuilt on every query run.
pub trait ScopeResolver: Send + Sync {
    /// Current identifier for `token`, or `None` when nothing is selected
    fn resolve(&self, token: ScopeToken) -> Option<String>;

    /// Scope the current credentials were granted for, when known
    ///
    /// Queries whose required tokens do not include the grant scope are
    /// disabled. Resolvers without a grant concept return `None`, which
    /// lets every query run unless [`requires_grant`](Self::requires_grant)
    /// is set.
    fn grant_scope(&self) -> Option<ScopeToken> {
        None
    }

    /// Whether an unknown grant scope disables queries
    ///
    /// Resolvers backed by a session that loads the grant asynchronously
    /// return `true` so nothing runs until the grant is known.
    fn requires_grant(&self) -> bool {
        false
    }

    /// Whether the application context has finished loading
    fn is_ready(&self) -> bool {
        true
    }
}

impl<R: ScopeResolver + ?Sized> ScopeResolver for std::sync::Arc<R> {
    fn resolve(&self, token: ScopeToken) -> Option<String> {
        (**self).resolve(token)
    }

    fn grant_scope(&self) -> Option<ScopeToken> {
        (**self).grant_scope()
    }

    fn requires_grant(&self) -> bool {
        (**self).requires_grant()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// A scope token paired with the value it resolved to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolvedScope {
    /// Token that was resolved
    pub token: ScopeToken,
    /// Runtime identifier (domain id, workspace id, user id)
    pub value: String,
}

impl Display for ResolvedScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.token, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_token_display_and_parse() {
        for token in ScopeToken::ALL {
            let parsed: ScopeToken = token.to_string().parse().unwrap();
            assert_eq!(parsed, token);
        }
        assert_eq!("workspace".parse::<ScopeToken>().unwrap(), ScopeToken::Workspace);
    }

    #[test]
    fn scope_token_rejects_unknown() {
        let err = "PROJECT".parse::<ScopeToken>().unwrap_err();
        assert_eq!(err.to_string(), "unknown scope token: 'PROJECT'");
    }

    #[test]
    fn scope_token_serde_uses_wire_names() {
        let json = serde_json::to_string(&ScopeToken::Workspace).unwrap();
        assert_eq!(json, "\"WORKSPACE\"");
    }
}
