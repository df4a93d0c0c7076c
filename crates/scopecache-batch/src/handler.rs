//! Batch consumers

use crate::error::BatchFetchError;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Receives flushed batches of unique ids
#[async_trait::async_trait]
pub trait BatchHandler: Send + Sync + 'static {
    /// Fetch (or otherwise process) `ids`
    ///
    /// The batcher keeps no retry state: a failure is logged and counted,
    /// and the handler is expected to record it wherever the ids are owned.
    async fn on_batch_ready(&self, ids: Vec<String>) -> Result<(), BatchFetchError>;
}

/// Adapter turning an async closure into a [`BatchHandler`]
pub struct FnBatchHandler<F> {
    f: F,
}

#[async_trait::async_trait]
impl<F> BatchHandler for FnBatchHandler<F>
where
    F: Fn(Vec<String>) -> BoxFuture<'static, Result<(), BatchFetchError>> + Send + Sync + 'static,
{
    async fn on_batch_ready(&self, ids: Vec<String>) -> Result<(), BatchFetchError> {
        (self.f)(ids).await
    }
}

/// Wrap an async closure as a shared handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn BatchHandler>
where
    F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BatchFetchError>> + Send + 'static,
{
    let boxed = move |ids: Vec<String>| -> BoxFuture<'static, Result<(), BatchFetchError>> {
        Box::pin(f(ids))
    };
    Arc::new(FnBatchHandler { f: boxed })
}
