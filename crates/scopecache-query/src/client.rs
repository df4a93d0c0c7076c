//! Query client: key builder + cache store + default policy

use crate::menu::MenuQueryHandlers;
use crate::pagination::{PageOptions, PaginationQuery};
use crate::policy::CachePolicy;
use crate::response::Paginated;
use crate::scoped::{QueryOptions, ScopedQuery};
use crate::store::QueryCache;
use scopecache_key::{KeyError, KeySpec, QueryKey, ScopeKeyBuilder, ScopeResolver, ScopeToken};
use std::sync::Arc;

/// Entry point for running scoped queries
///
/// Cheap to clone; clones share the cache store.
#[derive(Debug, Clone)]
pub struct QueryClient {
    keys: ScopeKeyBuilder,
    cache: QueryCache,
    policy: CachePolicy,
}

impl QueryClient {
    /// Client over `resolver` with a default cache
    #[must_use]
    pub fn new(resolver: Arc<dyn ScopeResolver>) -> Self {
        Self {
            keys: ScopeKeyBuilder::new(resolver),
            cache: QueryCache::default(),
            policy: CachePolicy::default(),
        }
    }

    /// With a specific cache store
    #[must_use]
    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = cache;
        self
    }

    /// With default policy for queries that set none
    #[must_use]
    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Key builder
    #[inline]
    #[must_use]
    pub fn keys(&self) -> &ScopeKeyBuilder {
        &self.keys
    }

    /// Cache store
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Default policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Key for `spec`, after the readiness check
    ///
    /// # Errors
    /// See [`ScopeKeyBuilder::build_checked`]
    pub fn build_key(&self, scopes: &[ScopeToken], spec: &KeySpec) -> Result<QueryKey, KeyError> {
        self.keys.build_checked(scopes, spec)
    }

    /// Create an observer for `options` gated on `scopes`
    pub fn run<T, U>(&self, options: QueryOptions<T, U>, scopes: &[ScopeToken]) -> ScopedQuery<T, U>
    where
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
    {
        ScopedQuery::new(self.clone(), options, scopes)
    }

    /// Create a paginated observer
    ///
    /// `options.key.params` are the filter parameters; a page object
    /// already in them is replaced.
    pub fn paginate<T>(
        &self,
        options: QueryOptions<T>,
        page: PageOptions,
        scopes: &[ScopeToken],
    ) -> PaginationQuery<T>
    where
        T: Paginated + Send + Sync + 'static,
    {
        PaginationQuery::new(self, options, page, scopes)
    }

    /// Drop every cached slot of one resource
    ///
    /// # Errors
    /// [`KeyError::ScopeUnresolved`] if a token has no value
    pub async fn invalidate_resource(
        &self,
        scopes: &[ScopeToken],
        service: &str,
        resource: &str,
    ) -> Result<usize, KeyError> {
        let prefix = self.keys.resource_prefix(scopes, service, resource)?;
        Ok(self.cache.invalidate_prefix(&prefix).await)
    }

    /// Factory for dropdown menu handlers
    #[must_use]
    pub fn menu_handlers(&self) -> MenuQueryHandlers {
        MenuQueryHandlers::new(self.cache.clone())
    }
}
