//! Scopecache Keys
//!
//! Deterministic, scope-partitioned cache keys for resource queries.
//!
//! # Core Concepts
//!
//! - [`ScopeToken`]: tenancy context a query depends on (domain, workspace, user)
//! - [`ScopeResolver`]: application-owned lookup of the current scope values
//! - [`ResourcePath`]: `service / resource / verb` triple
//! - [`Fingerprint`]: Blake3 digest of a canonically encoded parameter object
//! - [`QueryKey`]: ordered, typed key segments with prefix matching
//! - [`ScopeKeyBuilder`]: assembles keys and checks query readiness
//!
//! # Example
//!
//! ```rust
//! use scopecache_key::{ResourcePath, ScopeKeyBuilder, ScopeResolver, ScopeToken};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Fixed;
//! impl ScopeResolver for Fixed {
//!     fn resolve(&self, token: ScopeToken) -> Option<String> {
//!         (token == ScopeToken::Workspace).then(|| "ws-1".to_string())
//!     }
//! }
//!
//! let builder = ScopeKeyBuilder::new(Arc::new(Fixed));
//! let path = ResourcePath::new("identity", "user", "list");
//! let a = builder.build_key(&[ScopeToken::Workspace], &path, &json!({"b": 1, "a": 2}), None, None).unwrap();
//! let b = builder.build_key(&[ScopeToken::Workspace], &path, &json!({"a": 2, "b": 1}), None, None).unwrap();
//! assert_eq!(a, b);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod builder;
pub mod canonical;
pub mod error;
pub mod fingerprint;
pub mod key;
pub mod path;
pub mod scope;

// Re-exports
pub use builder::{KeySpec, ScopeKeyBuilder};
pub use error::KeyError;
pub use fingerprint::{Fingerprint, FingerprintError};
pub use key::{KeySegment, QueryKey};
pub use path::{PagePlacement, ResourcePath, Verb};
pub use scope::{ResolvedScope, ScopeResolver, ScopeToken, UnknownScopeToken};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
