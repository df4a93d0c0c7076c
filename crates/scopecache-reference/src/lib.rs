//! Scopecache Reference
//!
//! Map-like caches of display projections (`{key, label, name, data}`) for
//! entities referenced by id elsewhere in a page.
//!
//! # Core Concepts
//!
//! - [`ReferenceCache`]: reading an unseen id returns `None` and schedules one
//!   batched fetch for it; later reads return the fetched [`ReferenceItem`]
//! - [`EntryState`]: `Pending`, `Resolved`, `Missing` or `Failed` per id
//! - [`ReferenceSource`]: the list verb, id field and scopes a cache reads from
//! - [`ReferenceStore`]: type-erased handle so caches of different entities
//!   can be reset together
//!
//! # Example
//!
//! ```rust
//! use scopecache_batch::BatchConfig;
//! use scopecache_key::{ResourcePath, ScopeResolver, ScopeToken};
//! use scopecache_query::{fetcher_fn, ListResponse, QueryClient};
//! use scopecache_reference::{ReferenceCache, ReferenceConfig, ReferenceItem, ReferenceSource};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! struct Workspace;
//! impl ScopeResolver for Workspace {
//!     fn resolve(&self, token: ScopeToken) -> Option<String> {
//!         (token == ScopeToken::Workspace).then(|| "ws-1".to_string())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = fetcher_fn(|_params: Value| async {
//!     Ok(ListResponse::without_total(vec![json!({"project_id": "p-1", "name": "Web"})]))
//! });
//! let source = ReferenceSource::new(
//!     ResourcePath::new("inventory", "project", "list"),
//!     "project_id",
//!     &[ScopeToken::Workspace],
//!     fetcher,
//! );
//! let projects = ReferenceCache::new(
//!     QueryClient::new(Arc::new(Workspace)),
//!     source,
//!     |raw: &Value| {
//!         ReferenceItem::named(
//!             raw["project_id"].as_str().unwrap_or_default(),
//!             raw["name"].as_str().unwrap_or_default(),
//!             (),
//!         )
//!     },
//!     BatchConfig::default(),
//!     ReferenceConfig::default(),
//! )?;
//!
//! assert!(projects.get("p-1").is_none());
//! projects.flush().await;
//! assert_eq!(projects.get("p-1").unwrap().label, "Web");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod config;
pub mod error;
pub mod item;

// Re-exports
pub use cache::{Adaptor, LoadOutcome, ReferenceCache, ReferenceSource, ReferenceStats, ReferenceStore};
pub use config::ReferenceConfig;
pub use error::ReferenceError;
pub use item::{EntryState, ReferenceItem};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
