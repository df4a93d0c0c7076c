//! Key-addressed query cache using moka
//!
//! One slot per [`QueryKey`]. A fetch started for key K writes only to
//! slot K, and not at all if the cache was reset while it was in flight.
//! Concurrent requests for the same key share a single fetch.

use crate::error::QueryError;
use crate::policy::CachePolicy;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use moka::future::Cache;
use moka::Expiry;
use scopecache_key::QueryKey;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

type AnyValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<AnyValue, QueryError>>>;

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Approximate number of cached slots
    pub entry_count: u64,
    /// Requests served from a fresh slot
    pub hits: u64,
    /// Requests that found no fresh slot
    pub misses: u64,
    /// Fetches started
    pub fetches: u64,
    /// Requests that joined a fetch already in flight
    pub coalesced: u64,
    /// Fetch results dropped because of a reset
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    coalesced: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Clone)]
struct CacheEntry {
    value: AnyValue,
    fetched_at: Instant,
    gc_time: Duration,
}

/// Evicts an entry once it has been idle for its own `gc_time`
struct GcExpiry;

impl Expiry<QueryKey, CacheEntry> for GcExpiry {
    fn expire_after_create(
        &self,
        _key: &QueryKey,
        value: &CacheEntry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.gc_time)
    }

    fn expire_after_read(
        &self,
        _key: &QueryKey,
        value: &CacheEntry,
        _read_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
        _last_modified_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.gc_time)
    }

    fn expire_after_update(
        &self,
        _key: &QueryKey,
        value: &CacheEntry,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.gc_time)
    }
}

struct StoreInner {
    entries: Cache<QueryKey, CacheEntry>,
    in_flight: DashMap<QueryKey, (u64, SharedFetch)>,
    generation: AtomicU64,
    next_fetch: AtomicU64,
    counters: Counters,
}

impl StoreInner {
    async fn finish(
        &self,
        key: &QueryKey,
        fetch_id: u64,
        generation: u64,
        gc_time: Duration,
        result: Result<AnyValue, QueryError>,
    ) -> Result<AnyValue, QueryError> {
        let outcome = if self.generation.load(Ordering::Acquire) == generation {
            match result {
                Ok(value) => {
                    let entry = CacheEntry {
                        value: Arc::clone(&value),
                        fetched_at: Instant::now(),
                        gc_time,
                    };
                    self.entries.insert(key.clone(), entry).await;
                    trace!(%key, "stored query result");
                    Ok(value)
                }
                Err(err) => Err(err),
            }
        } else {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(%key, "discarding result fetched before cache reset");
            Err(QueryError::Cancelled)
        };
        self.in_flight.remove_if(key, |_, (id, _)| *id == fetch_id);
        outcome
    }
}

/// Query result cache
///
/// Cheap to clone; clones share storage.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl QueryCache {
    /// Create a cache holding at most `max_capacity` slots
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: Cache::builder()
                    .max_capacity(max_capacity)
                    .expire_after(GcExpiry)
                    .build(),
                in_flight: DashMap::new(),
                generation: AtomicU64::new(0),
                next_fetch: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    /// Return the cached value for `key` if fresh under `policy`, else fetch it
    ///
    /// A fetch already in flight for `key` is joined instead of starting
    /// another one. Failed fetches are not cached.
    ///
    /// # Errors
    /// - the fetcher's error, unchanged
    /// - [`QueryError::Cancelled`] if the cache was reset during the fetch
    /// - [`QueryError::TypeMismatch`] if the slot holds another type
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        key: &QueryKey,
        policy: CachePolicy,
        fetch: F,
    ) -> Result<Arc<T>, QueryError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        if let Some(entry) = self.inner.entries.get(key).await {
            if policy.is_fresh(entry.fetched_at.elapsed()) {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                trace!(%key, "query cache hit");
                return downcast(entry.value);
            }
        }
        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        let value = self.join_or_start(key, policy, fetch).await?;
        downcast(value)
    }

    /// Fetch `key` regardless of freshness (joins an in-flight fetch)
    ///
    /// # Errors
    /// Same as [`get_or_fetch`](Self::get_or_fetch)
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &QueryKey,
        policy: CachePolicy,
        fetch: F,
    ) -> Result<Arc<T>, QueryError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let value = self.join_or_start(key, policy, fetch).await?;
        downcast(value)
    }

    fn join_or_start<T, F, Fut>(&self, key: &QueryKey, policy: CachePolicy, fetch: F) -> SharedFetch
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        if let Some(running) = self.inner.in_flight.get(key) {
            self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            trace!(%key, "joining in-flight fetch");
            return running.1.clone();
        }

        let fetch_id = self.inner.next_fetch.fetch_add(1, Ordering::Relaxed);
        let generation = self.inner.generation.load(Ordering::Acquire);
        let inner = Arc::clone(&self.inner);
        let slot = key.clone();
        let pending = fetch();
        let task = async move {
            let result = pending.await.map(|value| Arc::new(value) as AnyValue);
            inner
                .finish(&slot, fetch_id, generation, policy.gc_time, result)
                .await
        }
        .boxed()
        .shared();

        match self.inner.in_flight.entry(key.clone()) {
            // lost a race with another caller; our future is dropped unpolled
            Entry::Occupied(running) => {
                self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                running.get().1.clone()
            }
            Entry::Vacant(slot) => {
                self.inner.counters.fetches.fetch_add(1, Ordering::Relaxed);
                debug!(%key, "starting query fetch");
                slot.insert((fetch_id, task.clone()));
                task
            }
        }
    }

    /// Cached value for `key`, fresh or not
    pub async fn peek<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        self.inner
            .entries
            .get(key)
            .await
            .and_then(|entry| entry.value.downcast::<T>().ok())
    }

    /// Age of the cached value for `key`
    pub async fn age(&self, key: &QueryKey) -> Option<Duration> {
        self.inner
            .entries
            .get(key)
            .await
            .map(|entry| entry.fetched_at.elapsed())
    }

    /// Whether a fetch for `key` is in flight
    #[must_use]
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner.in_flight.contains_key(key)
    }

    /// Write `value` into the slot for `key`
    pub async fn set<T: Send + Sync + 'static>(&self, key: &QueryKey, value: T, gc_time: Duration) -> Arc<T> {
        let value = Arc::new(value);
        let entry = CacheEntry {
            value: Arc::clone(&value) as AnyValue,
            fetched_at: Instant::now(),
            gc_time,
        };
        self.inner.entries.insert(key.clone(), entry).await;
        value
    }

    /// Drop the slot for `key`
    pub async fn invalidate(&self, key: &QueryKey) {
        self.inner.entries.invalidate(key).await;
    }

    /// Drop every slot whose key starts with `prefix`
    ///
    /// Returns the number of slots removed.
    pub async fn invalidate_prefix(&self, prefix: &QueryKey) -> usize {
        let matching: Vec<Arc<QueryKey>> = self
            .inner
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();
        for key in &matching {
            self.inner.entries.invalidate(key.as_ref()).await;
        }
        debug!(%prefix, removed = matching.len(), "invalidated query prefix");
        matching.len()
    }

    /// Drop every slot and discard every fetch currently in flight
    pub fn invalidate_all(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.in_flight.clear();
        self.inner.entries.invalidate_all();
        debug!("query cache reset");
    }

    /// Reset counter; changes on every [`invalidate_all`](Self::invalidate_all)
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Apply moka's pending maintenance (evictions, counts)
    pub async fn run_pending_tasks(&self) {
        self.inner.entries.run_pending_tasks().await;
    }

    /// Snapshot of the counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            entry_count: self.inner.entries.entry_count(),
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            fetches: c.fetches.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
        }
    }
}

impl Default for QueryCache {
    /// Cache with default capacity (10,000 slots)
    fn default() -> Self {
        Self::new(10_000)
    }
}

fn downcast<T: Send + Sync + 'static>(value: AnyValue) -> Result<Arc<T>, QueryError> {
    value.downcast::<T>().map_err(|_| QueryError::TypeMismatch {
        expected: std::any::type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopecache_key::{KeySegment, Verb};
    use std::sync::atomic::AtomicUsize;

    fn key(resource: &str, verb: Verb) -> QueryKey {
        QueryKey::from_segments(vec![
            KeySegment::Service("identity".to_string()),
            KeySegment::Resource(resource.to_string()),
            KeySegment::Verb(verb),
        ])
    }

    fn counting_fetch(
        counter: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, QueryError>> {
        let counter = Arc::clone(counter);
        move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_slot_skips_fetch() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = CachePolicy::default().with_stale_time(Duration::from_secs(60));
        let k = key("user", Verb::List);

        let first = cache.get_or_fetch(&k, policy, counting_fetch(&calls, 1)).await.unwrap();
        let second = cache.get_or_fetch(&k, policy, counting_fetch(&calls, 2)).await.unwrap();

        assert_eq!((*first, *second), (1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_slot_is_refetched() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = CachePolicy::default().with_stale_time(Duration::from_secs(10));
        let k = key("user", Verb::List);

        cache.get_or_fetch(&k, policy, counting_fetch(&calls, 1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        let value = cache.get_or_fetch(&k, policy, counting_fetch(&calls, 2)).await.unwrap();

        assert_eq!(*value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key("user", Verb::List);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let slow = {
            let calls = Arc::clone(&calls);
            move || {
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let _ = rx.await;
                    Ok::<u32, QueryError>(7)
                }
                .boxed()
            }
        };

        let a = cache.get_or_fetch(&k, CachePolicy::default(), slow);
        let b = cache.get_or_fetch(&k, CachePolicy::default(), counting_fetch(&calls, 9));
        let release = async {
            tokio::task::yield_now().await;
            let _ = tx.send(());
        };
        let (a, b, ()) = tokio::join!(a, b, release);

        assert_eq!((*a.unwrap(), *b.unwrap()), (7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().coalesced, 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let cache = QueryCache::default();
        let k = key("user", Verb::Get);

        let err = cache
            .get_or_fetch(&k, CachePolicy::default(), || async {
                Err::<u32, _>(QueryError::transport("boom"))
            })
            .await
            .unwrap_err();

        assert_eq!(err, QueryError::transport("boom"));
        assert!(cache.peek::<u32>(&k).await.is_none());
        assert!(!cache.is_fetching(&k));
    }

    #[tokio::test]
    async fn wrong_type_is_reported() {
        let cache = QueryCache::default();
        let k = key("user", Verb::Get);
        cache.set(&k, 5_u32, Duration::from_secs(60)).await;

        let result = cache
            .get_or_fetch::<String, _, _>(
                &k,
                CachePolicy::default().with_stale_time(Duration::from_secs(60)),
                || async { Ok("x".to_string()) },
            )
            .await;
        assert!(matches!(result, Err(QueryError::TypeMismatch { .. })));
    }

    #[tokio::test]
    async fn reset_discards_in_flight_result() {
        let cache = QueryCache::default();
        let k = key("user", Verb::List);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let pending = cache.get_or_fetch(&k, CachePolicy::default(), move || async move {
            let _ = rx.await;
            Ok::<u32, QueryError>(1)
        });
        let reset = async {
            tokio::task::yield_now().await;
            cache.invalidate_all();
            let _ = tx.send(());
        };
        let (result, ()) = tokio::join!(pending, reset);

        assert_eq!(result.unwrap_err(), QueryError::Cancelled);
        assert!(cache.peek::<u32>(&k).await.is_none());
        assert_eq!(cache.stats().discarded, 1);
        assert_eq!(cache.generation(), 1);
    }

    #[tokio::test]
    async fn invalidate_prefix_only_touches_matching_keys() {
        let cache = QueryCache::default();
        let user_list = key("user", Verb::List);
        let user_get = key("user", Verb::Get);
        let role_list = key("role", Verb::List);
        for k in [&user_list, &user_get, &role_list] {
            cache.set(k, 1_u32, Duration::from_secs(60)).await;
        }

        let removed = cache.invalidate_prefix(&user_list.truncated(2)).await;

        assert_eq!(removed, 2);
        assert!(cache.peek::<u32>(&user_list).await.is_none());
        assert!(cache.peek::<u32>(&user_get).await.is_none());
        assert!(cache.peek::<u32>(&role_list).await.is_some());
    }
}
