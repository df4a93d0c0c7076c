//! Error types for reference caches

use scopecache_batch::{BatchError, BatchFetchError};
use scopecache_key::KeyError;
use scopecache_query::QueryError;

/// Errors raised by [`ReferenceCache`](crate::ReferenceCache)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    /// Batcher could not be created
    #[error("batcher error: {0}")]
    Batch(#[from] BatchError),

    /// The batch containing the id failed
    #[error(transparent)]
    Fetch(#[from] BatchFetchError),

    /// Key could not be built (scope not ready, bad path)
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// A full-list load failed
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// The cache was reset while waiting
    #[error("reference cache was reset")]
    Reset,
}
