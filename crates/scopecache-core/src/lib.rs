//! Scopecache Core
//!
//! Configuration, logging and the [`ScopeCache`] facade tying the query
//! client and reference caches together.
//!
//! # Core Concepts
//!
//! - [`ScopeCacheConfig`]: TOML file plus `SCOPECACHE_*` environment overlay
//! - [`init_tracing`]: `tracing-subscriber` setup with `SCOPECACHE_LOG` override
//! - [`ScopeCache`]: one configured [`QueryClient`](scopecache_query::QueryClient)
//!   and the reference caches built through it, reset together on scope change
//! - [`ScopeCacheError`]: every crate's error behind one type
//!
//! # Example
//!
//! ```rust
//! use scopecache_core::{ScopeCache, ScopeCacheConfig};
//! use scopecache_key::{ScopeResolver, ScopeToken};
//! use std::sync::Arc;
//!
//! struct Workspace;
//! impl ScopeResolver for Workspace {
//!     fn resolve(&self, token: ScopeToken) -> Option<String> {
//!         (token == ScopeToken::Workspace).then(|| "ws-1".to_string())
//!     }
//! }
//!
//! let config = ScopeCacheConfig::from_toml_str("[query]\nstale_time_ms = 60000\n")?;
//! let cache = ScopeCache::new(config, Arc::new(Workspace))?;
//! assert_eq!(cache.client().policy().stale_time.as_secs(), 60);
//! cache.reset();
//! # Ok::<(), scopecache_core::ScopeCacheError>(())
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod facade;
pub mod logging;

// Re-exports
pub use config::{LoggingConfig, QueryConfig, ScopeCacheConfig};
pub use error::{ConfigError, ScopeCacheError, ScopeCacheResult};
pub use facade::ScopeCache;
pub use logging::{init_tracing, LOG_ENV};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
