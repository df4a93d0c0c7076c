//! Batcher configuration

use crate::error::BatchError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Flush thresholds for an [`IdBatcher`](crate::IdBatcher)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pending ids that trigger an immediate flush
    pub batch_size: usize,
    /// Quiet period after the last enqueue before a flush
    pub debounce_ms: u64,
    /// Maximum ids handed to one `on_batch_ready` call
    pub max_batch_size: usize,
}

impl BatchConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With flush threshold
    #[inline]
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// With debounce window
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With per-call ceiling
    #[inline]
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Debounce window as a [`Duration`]
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Check thresholds are usable
    ///
    /// # Errors
    /// [`BatchError::InvalidConfig`] unless `1 <= batch_size <= max_batch_size`
    /// and `debounce_ms > 0`
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.batch_size == 0 {
            return Err(BatchError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.max_batch_size < self.batch_size {
            return Err(BatchError::InvalidConfig(format!(
                "max_batch_size ({}) must not be smaller than batch_size ({})",
                self.max_batch_size, self.batch_size
            )));
        }
        if self.debounce_ms == 0 {
            return Err(BatchError::InvalidConfig("debounce_ms must be positive".into()));
        }
        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 15,
            debounce_ms: 300,
            max_batch_size: 45,
        }
    }
}
