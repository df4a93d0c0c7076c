//! Page-number bookkeeping over a [`ScopedQuery`]
//!
//! The page object is merged into the request parameters before the key is
//! built, so every page has its own cache slot. The parameters with the page
//! stripped form the *filter*; the total count is authoritative only while
//! it was reported for the current filter.

use crate::client::QueryClient;
use crate::page::{add_page_to_params, omit_page_from_params, PageRange};
use crate::response::Paginated;
use crate::scoped::{QueryOptions, QueryResult, ScopedQuery};
use parking_lot::Mutex;
use scopecache_key::{Fingerprint, ScopeToken, Verb};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Initial page state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    /// 1-based current page
    pub this_page: u64,
    /// Items per page
    pub page_size: u64,
}

impl PageOptions {
    /// Page `this_page` of size `page_size`
    #[inline]
    #[must_use]
    pub fn new(this_page: u64, page_size: u64) -> Self {
        Self {
            this_page: this_page.max(1),
            page_size: page_size.max(1),
        }
    }
}

impl Default for PageOptions {
    fn default() -> Self {
        Self::new(1, 15)
    }
}

/// Total item count and how far it can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TotalCount {
    /// No response for any filter yet
    #[default]
    Unknown,
    /// Reported for a previous filter; shown until the next response
    Provisional(u64),
    /// Reported by the latest response for the current filter
    Known(u64),
}

impl TotalCount {
    /// Count, if any
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Unknown => None,
            Self::Provisional(n) | Self::Known(n) => Some(*n),
        }
    }

    /// Reported for the current filter
    #[inline]
    #[must_use]
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    fn demote(self) -> Self {
        match self {
            Self::Known(n) => Self::Provisional(n),
            other => other,
        }
    }
}

/// Snapshot of a paginated query
pub struct PaginatedResult<T> {
    /// Current page's query snapshot
    pub query: QueryResult<T>,
    /// Total count for the current filter
    pub total_count: TotalCount,
    /// Current page
    pub this_page: u64,
    /// Current page size
    pub page_size: u64,
}

impl<T> PaginatedResult<T> {
    /// Current page's data
    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<&Arc<T>> {
        self.query.data.as_ref()
    }

    /// Current page has been loaded
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.query.data.is_some()
    }
}

impl<T: fmt::Debug> fmt::Debug for PaginatedResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginatedResult")
            .field("query", &self.query)
            .field("total_count", &self.total_count)
            .field("this_page", &self.this_page)
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[derive(Debug)]
struct PageState {
    base_params: Value,
    filter: Fingerprint,
    this_page: u64,
    page_size: u64,
    total: TotalCount,
}

impl PageState {
    fn paged_params(&self, verb: &Verb) -> Value {
        add_page_to_params(
            verb,
            &self.base_params,
            PageRange::for_page(self.this_page, self.page_size),
        )
    }
}

/// Table-style query with page number, page size and total count
pub struct PaginationQuery<T> {
    query: ScopedQuery<T>,
    verb: Verb,
    state: Mutex<PageState>,
}

impl<T> fmt::Debug for PaginationQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginationQuery")
            .field("verb", &self.verb)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl<T> PaginationQuery<T>
where
    T: Paginated + Send + Sync + 'static,
{
    pub(crate) fn new(
        client: &QueryClient,
        mut options: QueryOptions<T>,
        page: PageOptions,
        scopes: &[ScopeToken],
    ) -> Self {
        let verb = options.key.path.verb.clone();
        let base_params = omit_page_from_params(&verb, &options.key.params);
        let state = PageState {
            filter: Fingerprint::of_value(&base_params),
            base_params,
            this_page: page.this_page.max(1),
            page_size: page.page_size.max(1),
            total: TotalCount::Unknown,
        };
        options.key.params = state.paged_params(&verb);

        Self {
            query: client.run(options, scopes),
            verb,
            state: Mutex::new(state),
        }
    }

    /// Underlying scoped query
    #[inline]
    #[must_use]
    pub fn query(&self) -> &ScopedQuery<T> {
        &self.query
    }

    /// Current page
    #[must_use]
    pub fn this_page(&self) -> u64 {
        self.state.lock().this_page
    }

    /// Current page size
    #[must_use]
    pub fn page_size(&self) -> u64 {
        self.state.lock().page_size
    }

    /// Total count for the current filter
    #[must_use]
    pub fn total_count(&self) -> TotalCount {
        self.state.lock().total
    }

    /// Move to page `page` (1-based)
    pub fn set_page(&self, page: u64) {
        self.change(|state| state.this_page = page.max(1));
    }

    /// Change the page size
    pub fn set_page_size(&self, page_size: u64) {
        self.change(|state| state.page_size = page_size.max(1));
    }

    /// Replace the filter parameters
    ///
    /// A different filter demotes a known total count to provisional.
    pub fn set_params(&self, params: Value) {
        let verb = self.verb.clone();
        self.change(move |state| {
            let base_params = omit_page_from_params(&verb, &params);
            let filter = Fingerprint::of_value(&base_params);
            if filter != state.filter {
                debug!(filter = %filter.short(), "filter changed, total count provisional");
                state.total = state.total.demote();
                state.filter = filter;
            }
            state.base_params = base_params;
        });
    }

    fn change(&self, apply: impl FnOnce(&mut PageState)) {
        let params = {
            let mut state = self.state.lock();
            apply(&mut state);
            state.paged_params(&self.verb)
        };
        self.query.set_params(params);
    }

    /// Serve the current page from cache or fetch it
    pub async fn fetch(&self) -> PaginatedResult<T> {
        let filter = self.state.lock().filter;
        let result = self.query.fetch().await;
        self.finish(filter, result)
    }

    /// Fetch the current page even if cached
    pub async fn refetch(&self) -> PaginatedResult<T> {
        let filter = self.state.lock().filter;
        let result = self.query.refetch().await;
        self.finish(filter, result)
    }

    /// Latest snapshot without fetching
    #[must_use]
    pub fn snapshot(&self) -> PaginatedResult<T> {
        let state = self.state.lock();
        PaginatedResult {
            query: self.query.snapshot(),
            total_count: state.total,
            this_page: state.this_page,
            page_size: state.page_size,
        }
    }

    fn finish(&self, filter: Fingerprint, result: QueryResult<T>) -> PaginatedResult<T> {
        let mut state = self.state.lock();
        if state.filter == filter && result.is_success() {
            if let Some(data) = &result.data {
                state.total = data
                    .total_count()
                    .map_or(TotalCount::Unknown, TotalCount::Known);
            }
        }
        PaginatedResult {
            query: result,
            total_count: state.total,
            this_page: state.this_page,
            page_size: state.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ListResponse;
    use crate::scoped::QueryContext;
    use pretty_assertions::assert_eq;
    use scopecache_key::{KeySpec, ResourcePath, ScopeResolver};
    use serde_json::json;

    struct Domain;

    impl ScopeResolver for Domain {
        fn resolve(&self, token: ScopeToken) -> Option<String> {
            (token == ScopeToken::Domain).then(|| "domain-1".to_string())
        }
    }

    fn options(total: u64) -> QueryOptions<ListResponse<Value>> {
        let spec = KeySpec::new(ResourcePath::new("inventory", "server", "list"))
            .with_params(json!({"query": {"filter": []}}));
        QueryOptions::new(spec, move |ctx: QueryContext| async move {
            Ok(ListResponse::new(vec![ctx.params], total))
        })
    }

    #[tokio::test]
    async fn page_object_reaches_fetcher() {
        let client = QueryClient::new(Arc::new(Domain));
        let paged = client.paginate(options(42), PageOptions::new(3, 10), &[ScopeToken::Domain]);

        let result = paged.fetch().await;
        let params = &result.data().unwrap().results[0];
        assert_eq!(params["query"]["page"], json!({"start": 21, "limit": 10}));
        assert_eq!(result.total_count, TotalCount::Known(42));
    }

    #[tokio::test]
    async fn total_count_starts_unknown() {
        let client = QueryClient::new(Arc::new(Domain));
        let paged = client.paginate(options(5), PageOptions::default(), &[ScopeToken::Domain]);
        assert_eq!(paged.total_count(), TotalCount::Unknown);
        assert_eq!(paged.snapshot().total_count.value(), None);
    }

    #[tokio::test]
    async fn filter_change_demotes_total_but_page_change_keeps_it() {
        let client = QueryClient::new(Arc::new(Domain));
        let paged = client.paginate(options(42), PageOptions::new(1, 10), &[ScopeToken::Domain]);
        paged.fetch().await;

        paged.set_page(2);
        assert_eq!(paged.total_count(), TotalCount::Known(42));

        paged.set_params(json!({"query": {"filter": [{"k": "name", "v": "web", "o": "contain"}]}}));
        assert_eq!(paged.total_count(), TotalCount::Provisional(42));

        paged.fetch().await;
        assert_eq!(paged.total_count(), TotalCount::Known(42));
    }

    #[tokio::test]
    async fn page_in_params_does_not_change_filter() {
        let client = QueryClient::new(Arc::new(Domain));
        let paged = client.paginate(options(42), PageOptions::new(1, 10), &[ScopeToken::Domain]);
        paged.fetch().await;

        paged.set_params(json!({"query": {"filter": [], "page": {"start": 91, "limit": 10}}}));
        assert_eq!(paged.total_count(), TotalCount::Known(42));
    }
}
