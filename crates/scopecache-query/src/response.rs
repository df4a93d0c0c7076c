//! List responses and the transport seam

use crate::error::QueryError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// `{results, total_count?}` as returned by list-style verbs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse<E> {
    /// Entities on this page
    #[serde(default)]
    pub results: Vec<E>,
    /// Total matching entities, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl<E> ListResponse<E> {
    /// Response with a known total
    #[must_use]
    pub fn new(results: Vec<E>, total_count: u64) -> Self {
        Self {
            results,
            total_count: Some(total_count),
        }
    }

    /// Response without a total
    #[must_use]
    pub fn without_total(results: Vec<E>) -> Self {
        Self {
            results,
            total_count: None,
        }
    }
}

impl<E> Default for ListResponse<E> {
    fn default() -> Self {
        Self::without_total(Vec::new())
    }
}

/// Responses that can report a total count
pub trait Paginated {
    /// Total matching items, if known
    fn total_count(&self) -> Option<u64>;
}

impl<E> Paginated for ListResponse<E> {
    fn total_count(&self) -> Option<u64> {
        self.total_count
    }
}

/// Transport client for one resource's list-style verb
///
/// Assumed safe to retry; not assumed to dedupe concurrent identical calls.
#[async_trait::async_trait]
pub trait ListFetcher<E>: Send + Sync + 'static {
    /// Fetch one page for `params`
    async fn list(&self, params: Value) -> Result<ListResponse<E>, QueryError>;
}

struct FnListFetcher<F> {
    f: F,
}

#[async_trait::async_trait]
impl<E, F> ListFetcher<E> for FnListFetcher<F>
where
    E: Send + 'static,
    F: Fn(Value) -> BoxFuture<'static, Result<ListResponse<E>, QueryError>> + Send + Sync + 'static,
{
    async fn list(&self, params: Value) -> Result<ListResponse<E>, QueryError> {
        (self.f)(params).await
    }
}

/// Wrap an async closure as a shared fetcher
pub fn fetcher_fn<E, F, Fut>(f: F) -> Arc<dyn ListFetcher<E>>
where
    E: Send + 'static,
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ListResponse<E>, QueryError>> + Send + 'static,
{
    let boxed = move |params: Value| -> BoxFuture<'static, Result<ListResponse<E>, QueryError>> {
        Box::pin(f(params))
    };
    Arc::new(FnListFetcher { f: boxed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let response: ListResponse<Value> = serde_json::from_value(json!({})).unwrap();
        assert!(response.results.is_empty());
        assert_eq!(response.total_count(), None);
    }

    #[test]
    fn total_count_round_trips_from_wire() {
        let response: ListResponse<String> =
            serde_json::from_value(json!({"results": ["aws"], "total_count": 3})).unwrap();
        assert_eq!(response, ListResponse::new(vec!["aws".to_string()], 3));
    }

    #[tokio::test]
    async fn fetcher_fn_passes_params() {
        let fetcher = fetcher_fn(|params: Value| async move {
            Ok(ListResponse::without_total(vec![params]))
        });
        let response = fetcher.list(json!({"a": 1})).await.unwrap();
        assert_eq!(response.results, vec![json!({"a": 1})]);
    }
}
