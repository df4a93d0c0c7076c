//! Freshness and retention policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default retention for unused entries (5 minutes)
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

/// How long a cached result is reused and how long it is retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Age below which a cached result is served without refetching
    pub stale_time: Duration,
    /// Idle time after which an entry may be evicted
    pub gc_time: Duration,
}

impl CachePolicy {
    /// Policy with the given stale and gc times
    #[inline]
    #[must_use]
    pub const fn new(stale_time: Duration, gc_time: Duration) -> Self {
        Self {
            stale_time,
            gc_time,
        }
    }

    /// With stale time
    #[inline]
    #[must_use]
    pub const fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// With gc time
    #[inline]
    #[must_use]
    pub const fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    /// Whether a result of age `age` may be served without refetching
    #[inline]
    #[must_use]
    pub fn is_fresh(&self, age: Duration) -> bool {
        age < self.stale_time
    }
}

impl Default for CachePolicy {
    /// Always refetch, keep for five minutes
    fn default() -> Self {
        Self::new(Duration::ZERO, DEFAULT_GC_TIME)
    }
}
