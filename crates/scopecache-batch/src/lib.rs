//! Scopecache Batch
//!
//! Coalesces single-id fetch requests from many independent consumers into
//! bounded batch calls.
//!
//! # Core Concepts
//!
//! - [`IdBatcher`]: debounce + size-threshold state machine over a pending id set
//! - [`BatchHandler`]: async consumer invoked with each flushed batch
//! - [`BatchConfig`]: `batch_size` trigger, `debounce_ms` window, `max_batch_size` per-call ceiling
//! - [`BatchPhase`]: `Idle`, `Accumulating` or `Flushing`
//!
//! # Example
//!
//! ```rust
//! use scopecache_batch::{handler_fn, BatchConfig, BatchFetchError, IdBatcher};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let handler = handler_fn(|ids: Vec<String>| async move {
//!     assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
//!     Ok::<(), BatchFetchError>(())
//! });
//! let batcher = IdBatcher::new(BatchConfig::new().with_batch_size(2), handler).unwrap();
//! batcher.enqueue("a");
//! batcher.enqueue("b");
//! batcher.wait_idle().await;
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod batcher;
pub mod config;
pub mod error;
pub mod handler;

// Re-exports
pub use batcher::{BatchPhase, BatchStats, FlushTrigger, IdBatcher};
pub use config::BatchConfig;
pub use error::{BatchError, BatchFetchError};
pub use handler::{handler_fn, BatchHandler, FnBatchHandler};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
