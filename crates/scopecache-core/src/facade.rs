//! The application-facing cache
//!
//! Owns one [`QueryClient`] configured from [`ScopeCacheConfig`] and every
//! reference cache built through it, so a scope change can drop all of them
//! at once.

use crate::config::ScopeCacheConfig;
use crate::error::ScopeCacheResult;
use parking_lot::RwLock;
use scopecache_key::{KeyError, KeySpec, QueryKey, ScopeResolver, ScopeToken};
use scopecache_query::{
    MenuQueryHandlers, PageOptions, Paginated, PaginationQuery, QueryCache, QueryClient,
    QueryOptions, ScopedQuery,
};
use scopecache_reference::{ReferenceCache, ReferenceItem, ReferenceSource, ReferenceStore};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Query client plus the registry of reference caches
pub struct ScopeCache {
    config: ScopeCacheConfig,
    client: QueryClient,
    references: RwLock<Vec<Arc<dyn ReferenceStore>>>,
}

impl fmt::Debug for ScopeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeCache")
            .field("config", &self.config)
            .field("client", &self.client)
            .field("references", &self.references.read().len())
            .finish()
    }
}

impl ScopeCache {
    /// Cache over `resolver` configured by `config`
    ///
    /// # Errors
    /// [`ScopeCacheError::Config`](crate::ScopeCacheError::Config) if `config` is invalid
    pub fn new(config: ScopeCacheConfig, resolver: Arc<dyn ScopeResolver>) -> ScopeCacheResult<Self> {
        config.validate()?;
        let client = QueryClient::new(resolver)
            .with_cache(QueryCache::new(config.query.max_capacity))
            .with_policy(config.query.policy());
        Ok(Self {
            config,
            client,
            references: RwLock::new(Vec::new()),
        })
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ScopeCacheConfig {
        &self.config
    }

    /// Underlying query client
    #[inline]
    #[must_use]
    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    /// Build a checked key
    ///
    /// # Errors
    /// Any [`KeyError`], including the "not ready" ones
    pub fn build_key(&self, scopes: &[ScopeToken], spec: &KeySpec) -> Result<QueryKey, KeyError> {
        self.client.build_key(scopes, spec)
    }

    /// Start a scoped query
    pub fn run<T, U>(&self, options: QueryOptions<T, U>, scopes: &[ScopeToken]) -> ScopedQuery<T, U>
    where
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
    {
        self.client.run(options, scopes)
    }

    /// Start a paginated query
    pub fn paginate<T>(
        &self,
        options: QueryOptions<T>,
        page: PageOptions,
        scopes: &[ScopeToken],
    ) -> PaginationQuery<T>
    where
        T: Paginated + Send + Sync + 'static,
    {
        self.client.paginate(options, page, scopes)
    }

    /// Factory for menu handlers over the shared cache
    #[must_use]
    pub fn menu_handlers(&self) -> MenuQueryHandlers {
        self.client.menu_handlers()
    }

    /// Build a reference cache with the configured batch and retry settings
    ///
    /// The cache is registered for [`reset`](Self::reset).
    ///
    /// # Errors
    /// [`ScopeCacheError::Reference`](crate::ScopeCacheError::Reference) if
    /// no tokio runtime is available
    pub fn reference<R, D, F>(
        &self,
        source: ReferenceSource<R>,
        adaptor: F,
    ) -> ScopeCacheResult<ReferenceCache<R, D>>
    where
        R: Send + Sync + 'static,
        D: Send + Sync + 'static,
        F: Fn(&R) -> ReferenceItem<D> + Send + Sync + 'static,
    {
        let cache = ReferenceCache::new(
            self.client.clone(),
            source,
            adaptor,
            self.config.batch,
            self.config.reference,
        )?;
        self.register(Arc::new(cache.clone()));
        Ok(cache)
    }

    /// Register an externally built reference cache for [`reset`](Self::reset)
    pub fn register(&self, store: Arc<dyn ReferenceStore>) {
        info!(path = %store.path(), "registered reference cache");
        self.references.write().push(store);
    }

    /// Number of registered reference caches
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.references.read().len()
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
        self.client.invalidate_resource(scopes, service, resource).await
    }

    /// Forget everything after a scope change
    ///
    /// Clears the query cache and resets every registered reference cache.
    /// Fetches started before the reset complete but are not stored.
    pub fn reset(&self) {
        self.client.cache().invalidate_all();
        let references = self.references.read();
        for store in references.iter() {
            store.reset();
        }
        info!(references = references.len(), "scope cache reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::error::{ConfigError, ScopeCacheError};
    use std::time::Duration;

    struct NoScopes;

    impl ScopeResolver for NoScopes {
        fn resolve(&self, _token: ScopeToken) -> Option<String> {
            None
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ScopeCacheConfig::new().with_query(QueryConfig::default().with_max_capacity(0));
        let err = ScopeCache::new(config, Arc::new(NoScopes)).unwrap_err();
        assert!(matches!(err, ScopeCacheError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn client_takes_configured_policy() {
        let config = ScopeCacheConfig::new()
            .with_query(QueryConfig::default().with_stale_time(Duration::from_secs(30)));
        let cache = ScopeCache::new(config, Arc::new(NoScopes)).unwrap();
        assert_eq!(cache.client().policy().stale_time, Duration::from_secs(30));
        assert_eq!(cache.reference_count(), 0);
    }
}
