//! Scopecache Query
//!
//! Scope-gated queries over a key-addressed cache store.
//!
//! # Core Concepts
//!
//! - [`QueryCache`]: moka-backed slots keyed by [`QueryKey`](scopecache_key::QueryKey),
//!   with freshness checks, fetch coalescing and reset-safe writes
//! - [`QueryClient`]: key builder + cache + default [`CachePolicy`]
//! - [`ScopedQuery`]: one observer of one slot, disabled until its scopes resolve
//! - [`PaginationQuery`]: page bookkeeping and a [`TotalCount`] that knows when it is stale
//! - [`MenuQueryHandlers`]: cached dropdown search over list and stat verbs
//!
//! # Example
//!
//! ```rust
//! use scopecache_key::{KeySpec, ResourcePath, ScopeResolver, ScopeToken};
//! use scopecache_query::{QueryClient, QueryContext, QueryOptions};
//! use serde_json::json;
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
//! # async fn main() {
//! let client = QueryClient::new(Arc::new(Workspace));
//! let spec = KeySpec::new(ResourcePath::new("identity", "user", "list"))
//!     .with_params(json!({"query": {"only": ["name"]}}));
//! let query = client.run(
//!     QueryOptions::new(spec, |_ctx: QueryContext| async { Ok(vec!["alice".to_string()]) }),
//!     &[ScopeToken::Workspace],
//! );
//! let result = query.fetch().await;
//! assert_eq!(result.data.unwrap().len(), 1);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod client;
pub mod error;
pub mod filter;
pub mod menu;
pub mod page;
pub mod pagination;
pub mod policy;
pub mod response;
pub mod scoped;
pub mod store;

// Re-exports
pub use client::QueryClient;
pub use error::QueryError;
pub use filter::{ApiQuery, Filter, FilterOp};
pub use menu::{
    ListMenuConfig, ListMenuHandler, MenuItem, MenuQueryHandlers, MenuResponse, StatMenuConfig,
    StatMenuHandler, MENU_POLICY,
};
pub use page::{add_page_to_params, omit_page_from_params, page_start, this_page, PageRange};
pub use pagination::{PageOptions, PaginatedResult, PaginationQuery, TotalCount};
pub use policy::{CachePolicy, DEFAULT_GC_TIME};
pub use response::{fetcher_fn, ListFetcher, ListResponse, Paginated};
pub use scoped::{
    DisabledReason, QueryContext, QueryFn, QueryOptions, QueryResult, QueryStatus, ScopedQuery,
};
pub use store::{CacheStats, QueryCache};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
