//! Reference items and holder states

use scopecache_batch::BatchFetchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// Display projection of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceItem<D> {
    /// Entity id
    pub key: String,
    /// Display label
    pub label: String,
    /// Entity name
    pub name: String,
    /// Minimal entity data
    pub data: D,
}

impl<D> ReferenceItem<D> {
    /// Item whose label and name are both `name`
    #[must_use]
    pub fn named(key: impl Into<String>, name: impl Into<String>, data: D) -> Self {
        let name = name.into();
        Self {
            key: key.into(),
            label: name.clone(),
            name,
            data,
        }
    }
}

/// Value held for one id
pub enum EntryState<D> {
    /// Requested, no response yet
    Pending,
    /// Latest fetched projection
    Resolved(Arc<ReferenceItem<D>>),
    /// A successful response did not contain the id
    Missing,
    /// The batch containing the id failed
    Failed {
        /// Batch failure
        error: BatchFetchError,
        /// When the failure was recorded
        at: Instant,
    },
}

impl<D> EntryState<D> {
    /// Resolved item, if any
    #[must_use]
    pub fn item(&self) -> Option<&Arc<ReferenceItem<D>>> {
        match self {
            Self::Resolved(item) => Some(item),
            _ => None,
        }
    }

    /// Not waiting on a fetch
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl<D> Clone for EntryState<D> {
    fn clone(&self) -> Self {
        match self {
            Self::Pending => Self::Pending,
            Self::Resolved(item) => Self::Resolved(Arc::clone(item)),
            Self::Missing => Self::Missing,
            Self::Failed { error, at } => Self::Failed {
                error: error.clone(),
                at: *at,
            },
        }
    }
}

impl<D: fmt::Debug> fmt::Debug for EntryState<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Resolved(item) => f.debug_tuple("Resolved").field(item).finish(),
            Self::Missing => f.write_str("Missing"),
            Self::Failed { error, .. } => f.debug_struct("Failed").field("error", error).finish_non_exhaustive(),
        }
    }
}

impl<D: PartialEq> PartialEq for EntryState<D> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Pending, Self::Pending) | (Self::Missing, Self::Missing) => true,
            (Self::Resolved(a), Self::Resolved(b)) => a == b,
            (Self::Failed { error: a, .. }, Self::Failed { error: b, .. }) => a == b,
            _ => false,
        }
    }
}
