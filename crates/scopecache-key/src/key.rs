//! Query keys
//!
//! A [`QueryKey`] is an ordered list of typed segments:
//!
//! ```text
//! [scope values..] service resource verb [entity] params-fingerprint [deps-fingerprint] [suffix..]
//! ```
//!
//! The order is fixed so that prefix matching ("everything under this
//! resource") works. Segments are typed, so an entity id can never compare
//! equal to a scope value or a fingerprint.

use crate::fingerprint::Fingerprint;
use crate::path::Verb;
use crate::scope::ResolvedScope;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// One element of a [`QueryKey`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeySegment {
    /// Resolved scope value
    Scope(ResolvedScope),
    /// Service name
    Service(String),
    /// Resource name
    Resource(String),
    /// Verb
    Verb(Verb),
    /// Optional entity id (e.g. the selected dashboard)
    Entity(String),
    /// Canonical parameter fingerprint
    Params(Fingerprint),
    /// Canonical fingerprint of extra dependencies
    Deps(Fingerprint),
    /// Caller-supplied suffix (see [`QueryKey::with_suffix`])
    Suffix(Fingerprint),
}

impl Display for KeySegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scope(scope) => write!(f, "{scope}"),
            Self::Service(s) | Self::Resource(s) => f.write_str(s),
            Self::Verb(v) => write!(f, "{v}"),
            Self::Entity(id) => write!(f, "@{id}"),
            Self::Params(fp) => write!(f, "#{}", fp.short()),
            Self::Deps(fp) => write!(f, "deps#{}", fp.short()),
            Self::Suffix(fp) => write!(f, "+{}", fp.short()),
        }
    }
}

impl Serialize for KeySegment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Immutable, cheaply clonable cache key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryKey {
    segments: Arc<[KeySegment]>,
}

impl QueryKey {
    /// Build a key from raw segments
    ///
    /// Prefer [`ScopeKeyBuilder`](crate::ScopeKeyBuilder), which enforces
    /// segment order.
    #[must_use]
    pub fn from_segments(segments: Vec<KeySegment>) -> Self {
        Self {
            segments: segments.into(),
        }
    }

    /// All segments in order
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }

    /// Number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the key has no segments
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `prefix` is a leading sub-sequence of this key
    #[must_use]
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Key truncated to its first `len` segments
    #[must_use]
    pub fn truncated(&self, len: usize) -> Self {
        let len = len.min(self.segments.len());
        Self::from_segments(self.segments[..len].to_vec())
    }

    /// Scope values at the head of the key
    pub fn scopes(&self) -> impl Iterator<Item = &ResolvedScope> {
        self.segments.iter().map_while(|s| match s {
            KeySegment::Scope(scope) => Some(scope),
            _ => None,
        })
    }

    /// Params fingerprint, if the key carries one
    #[must_use]
    pub fn params(&self) -> Option<Fingerprint> {
        self.segments.iter().find_map(|s| match s {
            KeySegment::Params(fp) => Some(*fp),
            _ => None,
        })
    }

    /// Prefix ending at the resource segment (scopes + service + resource)
    #[must_use]
    pub fn resource_prefix(&self) -> Self {
        let end = self
            .segments
            .iter()
            .position(|s| matches!(s, KeySegment::Resource(_)))
            .map_or(self.segments.len(), |i| i + 1);
        self.truncated(end)
    }

    /// New key with a fingerprint of `suffix` appended
    #[must_use]
    pub fn with_suffix(&self, suffix: &Value) -> Self {
        let mut segments = self.segments.to_vec();
        segments.push(KeySegment::Suffix(Fingerprint::of_value(suffix)));
        Self::from_segments(segments)
    }
}

impl Serialize for QueryKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(self.segments.iter())
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}
