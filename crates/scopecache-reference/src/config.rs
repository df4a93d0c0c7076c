//! Reference cache configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry and reload timing for a [`ReferenceCache`](crate::ReferenceCache)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Minimum wait before a failed id is fetched again on read
    pub retry_cooldown_ms: u64,
    /// Minimum age of a full-list load before a non-forced reload
    pub reload_interval_ms: u64,
}

impl ReferenceConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With retry cooldown
    #[inline]
    #[must_use]
    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown_ms = u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With reload interval
    #[inline]
    #[must_use]
    pub fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Retry cooldown as a [`Duration`]
    #[inline]
    #[must_use]
    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.retry_cooldown_ms)
    }

    /// Reload interval as a [`Duration`]
    #[inline]
    #[must_use]
    pub fn reload_interval(&self) -> Duration {
        Duration::from_millis(self.reload_interval_ms)
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            retry_cooldown_ms: 30_000,
            reload_interval_ms: 300_000,
        }
    }
}
