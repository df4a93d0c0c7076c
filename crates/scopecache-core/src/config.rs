//! Workspace-wide configuration
//!
//! Loaded from TOML (every field optional) and overlaid with `SCOPECACHE_*`
//! environment variables:
//!
//! ```toml
//! [batch]
//! batch_size = 15
//! debounce_ms = 300
//! max_batch_size = 45
//!
//! [query]
//! stale_time_ms = 0
//! gc_time_ms = 300000
//! max_capacity = 10000
//!
//! [reference]
//! retry_cooldown_ms = 30000
//! reload_interval_ms = 300000
//!
//! [logging]
//! filter = "info"
//! json = false
//! ```

use crate::error::ConfigError;
use scopecache_batch::BatchConfig;
use scopecache_query::{CachePolicy, DEFAULT_GC_TIME};
use scopecache_reference::ReferenceConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variables read by [`ScopeCacheConfig::apply_env`]
pub mod env {
    /// Flush threshold
    pub const BATCH_SIZE: &str = "SCOPECACHE_BATCH_SIZE";
    /// Debounce window in milliseconds
    pub const DEBOUNCE_MS: &str = "SCOPECACHE_DEBOUNCE_MS";
    /// Per-call ceiling
    pub const MAX_BATCH_SIZE: &str = "SCOPECACHE_MAX_BATCH_SIZE";
    /// Default stale time in milliseconds
    pub const STALE_TIME_MS: &str = "SCOPECACHE_STALE_TIME_MS";
    /// Default gc time in milliseconds
    pub const GC_TIME_MS: &str = "SCOPECACHE_GC_TIME_MS";
    /// JSON log output
    pub const LOG_JSON: &str = "SCOPECACHE_LOG_JSON";
}

/// Query cache defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Default stale time for queries that set none
    pub stale_time_ms: u64,
    /// Default retention of unused entries
    pub gc_time_ms: u64,
    /// Maximum entries in the cache store
    pub max_capacity: u64,
}

impl QueryConfig {
    /// With stale time
    #[inline]
    #[must_use]
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time_ms = u64::try_from(stale_time.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With gc time
    #[inline]
    #[must_use]
    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time_ms = u64::try_from(gc_time.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With cache capacity
    #[inline]
    #[must_use]
    pub fn with_max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Default policy for the client
    #[must_use]
    pub fn policy(&self) -> CachePolicy {
        CachePolicy::new(
            Duration::from_millis(self.stale_time_ms),
            Duration::from_millis(self.gc_time_ms),
        )
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: 0,
            gc_time_ms: u64::try_from(DEFAULT_GC_TIME.as_millis()).unwrap_or(u64::MAX),
            max_capacity: 10_000,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `SCOPECACHE_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl LoggingConfig {
    /// With filter directive
    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// With JSON output
    #[inline]
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeCacheConfig {
    /// Id batching thresholds
    pub batch: BatchConfig,
    /// Query cache defaults
    pub query: QueryConfig,
    /// Reference cache timing
    pub reference: ReferenceConfig,
    /// Log output
    pub logging: LoggingConfig,
}

impl ScopeCacheConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With batch settings
    #[inline]
    #[must_use]
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// With query settings
    #[inline]
    #[must_use]
    pub fn with_query(mut self, query: QueryConfig) -> Self {
        self.query = query;
        self
    }

    /// With reference settings
    #[inline]
    #[must_use]
    pub fn with_reference(mut self, reference: ReferenceConfig) -> Self {
        self.reference = reference;
        self
    }

    /// With logging settings
    #[inline]
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Parse TOML text; missing fields take their defaults
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for malformed text or mistyped fields
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// - [`ConfigError::Io`] if the file cannot be read
    /// - [`ConfigError::Parse`] if its contents are invalid
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Overlay `SCOPECACHE_*` variables from the process environment
    ///
    /// # Errors
    /// [`ConfigError::Env`] if a set variable does not parse
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Overlay variables read through `lookup`
    ///
    /// # Errors
    /// [`ConfigError::Env`] if a present value does not parse
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, env::BATCH_SIZE)? {
            self.batch.batch_size = v;
        }
        if let Some(v) = parse_var(&lookup, env::DEBOUNCE_MS)? {
            self.batch.debounce_ms = v;
        }
        if let Some(v) = parse_var(&lookup, env::MAX_BATCH_SIZE)? {
            self.batch.max_batch_size = v;
        }
        if let Some(v) = parse_var(&lookup, env::STALE_TIME_MS)? {
            self.query.stale_time_ms = v;
        }
        if let Some(v) = parse_var(&lookup, env::GC_TIME_MS)? {
            self.query.gc_time_ms = v;
        }
        if let Some(raw) = lookup(env::LOG_JSON) {
            self.logging.json = parse_bool(&raw).ok_or(ConfigError::Env {
                var: env::LOG_JSON,
                value: raw,
            })?;
        }
        Ok(self)
    }

    /// Check every section
    ///
    /// # Errors
    /// - [`ConfigError::Batch`] for inconsistent batch thresholds
    /// - [`ConfigError::Invalid`] for a zero cache capacity
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.batch.validate()?;
        if self.query.max_capacity == 0 {
            return Err(ConfigError::Invalid("query.max_capacity must be positive".into()));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value: raw }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}
