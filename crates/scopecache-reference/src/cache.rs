//! Lazily populated reference cache
//!
//! Reading an unseen id creates its holder (in `Pending`) and enqueues the id
//! exactly once; the holder's existence is the dedup check and is created
//! under the map's entry lock before the enqueue. Flushed batches are fetched
//! as one `in` filter through the query cache and routed back to holders by
//! the adaptor's `key`.
//!
//! Holder transitions:
//!
//! ```text
//! (none) ──read──▶ Pending ──response has id──▶ Resolved
//!                     │    ──response lacks id─▶ Missing   (never refetched until reset)
//!                     └────batch failed────────▶ Failed ──read after cooldown──▶ Pending
//! ```
//!
//! A batch whose scopes are not ready yet is not a failure: its ids stay
//! `Pending` and are parked, and the next read of a parked id enqueues it
//! again with no cooldown.

use crate::config::ReferenceConfig;
use crate::error::ReferenceError;
use crate::item::{EntryState, ReferenceItem};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use scopecache_batch::{BatchConfig, BatchFetchError, BatchHandler, BatchStats, IdBatcher};
use scopecache_key::{KeySpec, ResourcePath, ScopeToken};
use scopecache_query::{ApiQuery, CachePolicy, Filter, ListFetcher, ListResponse, QueryClient, QueryError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Projection from a raw entity to a [`ReferenceItem`]
pub type Adaptor<R, D> = Arc<dyn Fn(&R) -> ReferenceItem<D> + Send + Sync>;

/// Where a reference cache reads from
pub struct ReferenceSource<R> {
    /// Resource path of the list verb
    pub path: ResourcePath,
    /// Field holding the entity id, used in the batch filter
    pub id_key: String,
    /// Scope tokens the resource depends on
    pub scopes: Vec<ScopeToken>,
    /// Transport for the list verb
    pub fetcher: Arc<dyn ListFetcher<R>>,
}

impl<R> ReferenceSource<R> {
    /// Source listing `path`, filtering batches on `id_key`
    #[must_use]
    pub fn new(
        path: ResourcePath,
        id_key: impl Into<String>,
        scopes: &[ScopeToken],
        fetcher: Arc<dyn ListFetcher<R>>,
    ) -> Self {
        Self {
            path,
            id_key: id_key.into(),
            scopes: scopes.to_vec(),
            fetcher,
        }
    }
}

impl<R> fmt::Debug for ReferenceSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceSource")
            .field("path", &self.path)
            .field("id_key", &self.id_key)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// Result of [`ReferenceCache::load_all`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The last full load is younger than the reload interval
    Fresh,
    /// This many items were loaded
    Loaded(usize),
}

/// Holder counts by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferenceStats {
    /// Waiting on a fetch
    pub pending: usize,
    /// Holding an item
    pub resolved: usize,
    /// Confirmed absent
    pub missing: usize,
    /// Last batch failed
    pub failed: usize,
    /// Pending ids waiting for their scopes to resolve
    pub parked: usize,
    /// Batcher counters
    pub batch: BatchStats,
}

struct CacheInner<R, D> {
    source: ReferenceSource<R>,
    adaptor: Adaptor<R, D>,
    client: QueryClient,
    config: ReferenceConfig,
    holders: DashMap<String, watch::Sender<EntryState<D>>>,
    epoch: RwLock<u64>,
    parked: Mutex<HashSet<String>>,
    last_loaded_at: Mutex<Option<Instant>>,
}

impl<R, D> CacheInner<R, D>
where
    R: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    fn policy(&self) -> CachePolicy {
        self.client.policy()
    }

    fn spec(&self, params: Value) -> KeySpec {
        KeySpec::new(self.source.path.clone()).with_params(params)
    }

    async fn fetch(&self, params: Value, force: bool) -> Result<Arc<ListResponse<R>>, ReferenceError> {
        let key = self.client.build_key(&self.source.scopes, &self.spec(params.clone()))?;
        let fetcher = Arc::clone(&self.source.fetcher);
        let fetch = move || async move { fetcher.list(params).await };
        let cache = self.client.cache();
        let response = if force {
            cache.fetch(&key, self.policy(), fetch).await?
        } else {
            cache.get_or_fetch(&key, self.policy(), fetch).await?
        };
        Ok(response)
    }

    /// Write `state` to the holder for `id`, creating it only for resolved items
    fn publish(&self, id: &str, state: EntryState<D>) {
        match self.holders.entry(id.to_string()) {
            Entry::Occupied(holder) => {
                holder.get().send_replace(state);
            }
            Entry::Vacant(slot) => {
                if matches!(state, EntryState::Resolved(_)) {
                    slot.insert(watch::channel(state).0);
                }
            }
        }
    }

    /// Route `response` into holders; ids in `requested` it lacks become `Missing`
    fn route<'a>(&self, response: &ListResponse<R>, requested: impl Iterator<Item = &'a str>) -> usize {
        let mut seen = HashSet::with_capacity(response.results.len());
        for raw in &response.results {
            let item = (self.adaptor)(raw);
            seen.insert(item.key.clone());
            let key = item.key.clone();
            self.publish(&key, EntryState::Resolved(Arc::new(item)));
        }
        for id in requested {
            if !seen.contains(id) {
                self.publish(id, EntryState::Missing);
            }
        }
        seen.len()
    }

    fn fail(&self, ids: &[String], error: &BatchFetchError) {
        let at = Instant::now();
        for id in ids {
            self.publish(
                id,
                EntryState::Failed {
                    error: error.clone(),
                    at,
                },
            );
        }
    }
}

#[async_trait::async_trait]
impl<R, D> BatchHandler for CacheInner<R, D>
where
    R: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    async fn on_batch_ready(&self, ids: Vec<String>) -> Result<(), BatchFetchError> {
        let started = *self.epoch.read();
        let params = ApiQuery::new()
            .with_filter(Filter::any_of(self.source.id_key.clone(), ids.iter().cloned()))
            .into_params();
        let outcome = self.fetch(params, false).await;

        let epoch = self.epoch.read();
        if *epoch != started {
            debug!(path = %self.source.path, ids = ids.len(), "dropping batch fetched before reset");
            return Ok(());
        }
        match outcome {
            Ok(response) => {
                let found = self.route(&response, ids.iter().map(String::as_str));
                debug!(path = %self.source.path, requested = ids.len(), found, "routed reference batch");
                Ok(())
            }
            Err(ReferenceError::Query(QueryError::Cancelled)) => Ok(()),
            Err(ReferenceError::Key(err)) if err.is_not_ready() => {
                debug!(path = %self.source.path, ids = ids.len(), reason = %err, "parking reference batch until scopes resolve");
                self.parked.lock().extend(ids);
                Ok(())
            }
            Err(err) => {
                let error = BatchFetchError::new(&err);
                warn!(path = %self.source.path, ids = ids.len(), error = %err, "reference batch failed");
                self.fail(&ids, &error);
                Err(error)
            }
        }
    }
}

/// Map-like cache of reference items, populated on read
pub struct ReferenceCache<R, D> {
    inner: Arc<CacheInner<R, D>>,
    batcher: IdBatcher,
}

impl<R, D> Clone for ReferenceCache<R, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            batcher: self.batcher.clone(),
        }
    }
}

impl<R, D> fmt::Debug for ReferenceCache<R, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceCache")
            .field("source", &self.inner.source)
            .field("holders", &self.inner.holders.len())
            .field("batcher", &self.batcher)
            .finish_non_exhaustive()
    }
}

impl<R, D> ReferenceCache<R, D>
where
    R: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    /// Create a cache reading from `source` through `client`
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// [`ReferenceError::Batch`] if `batch` is invalid or no runtime is available
    pub fn new<F>(
        client: QueryClient,
        source: ReferenceSource<R>,
        adaptor: F,
        batch: BatchConfig,
        config: ReferenceConfig,
    ) -> Result<Self, ReferenceError>
    where
        F: Fn(&R) -> ReferenceItem<D> + Send + Sync + 'static,
    {
        let inner = Arc::new(CacheInner {
            source,
            adaptor: Arc::new(adaptor),
            client,
            config,
            holders: DashMap::new(),
            epoch: RwLock::new(0),
            parked: Mutex::new(HashSet::new()),
            last_loaded_at: Mutex::new(None),
        });
        let handler: Arc<dyn BatchHandler> = Arc::clone(&inner) as Arc<dyn BatchHandler>;
        let batcher = IdBatcher::new(batch, handler)?;
        Ok(Self { inner, batcher })
    }

    /// Resource path served by this cache
    #[inline]
    #[must_use]
    pub fn path(&self) -> &ResourcePath {
        &self.inner.source.path
    }

    /// The id batcher
    #[inline]
    #[must_use]
    pub fn batcher(&self) -> &IdBatcher {
        &self.batcher
    }

    /// Find or create the holder for `id`, enqueueing when a fetch is due
    fn touch(&self, id: &str) -> watch::Receiver<EntryState<D>> {
        let (rx, enqueue) = match self.inner.holders.entry(id.to_string()) {
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(EntryState::Pending);
                slot.insert(tx);
                (rx, true)
            }
            Entry::Occupied(holder) => {
                let retry = match &*holder.get().borrow() {
                    EntryState::Failed { at, .. } => at.elapsed() >= self.inner.config.retry_cooldown(),
                    EntryState::Pending => self.inner.parked.lock().remove(id),
                    _ => false,
                };
                if retry {
                    debug!(id, "re-enqueueing reference id");
                    holder.get().send_replace(EntryState::Pending);
                }
                (holder.get().subscribe(), retry)
            }
        };
        if enqueue {
            self.batcher.enqueue(id);
        }
        rx
    }

    /// Item for `id`, if already fetched
    ///
    /// A miss returns `None` immediately and schedules one fetch for the id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ReferenceItem<D>>> {
        if id.trim().is_empty() {
            return None;
        }
        let rx = self.touch(id);
        let item = rx.borrow().item().cloned();
        item
    }

    /// Current state for `id` without scheduling a fetch
    #[must_use]
    pub fn state(&self, id: &str) -> Option<EntryState<D>> {
        let holder = self.inner.holders.get(id)?;
        let state = holder.borrow().clone();
        Some(state)
    }

    /// Observe the holder for `id` (scheduling a fetch like [`get`](Self::get))
    #[must_use]
    pub fn watch(&self, id: &str) -> watch::Receiver<EntryState<D>> {
        self.touch(id)
    }

    /// Wait until `id` resolves, is confirmed missing, or fails
    ///
    /// While the scopes are not ready the id stays pending and this keeps
    /// waiting; a later read after the scopes resolve fetches it.
    ///
    /// # Errors
    /// - [`ReferenceError::Fetch`] if the batch containing `id` failed
    /// - [`ReferenceError::Reset`] if the cache was reset while waiting
    pub async fn resolve(&self, id: &str) -> Result<Option<Arc<ReferenceItem<D>>>, ReferenceError> {
        if id.trim().is_empty() {
            return Ok(None);
        }
        let mut rx = self.touch(id);
        let state = rx
            .wait_for(EntryState::is_terminal)
            .await
            .map_err(|_| ReferenceError::Reset)?
            .clone();
        match state {
            EntryState::Resolved(item) => Ok(Some(item)),
            EntryState::Failed { error, .. } => Err(ReferenceError::Fetch(error)),
            EntryState::Missing | EntryState::Pending => Ok(None),
        }
    }

    /// Every resolved item by id
    #[must_use]
    pub fn resolved(&self) -> HashMap<String, Arc<ReferenceItem<D>>> {
        self.inner
            .holders
            .iter()
            .filter_map(|holder| {
                let item = holder.value().borrow().item().cloned();
                item.map(|item| (holder.key().clone(), item))
            })
            .collect()
    }

    /// Fetch the whole list and fill every holder
    ///
    /// Skipped when the last full load is younger than the reload interval,
    /// unless `force`. Pending ids absent from the list become `Missing`.
    ///
    /// # Errors
    /// - [`ReferenceError::Key`] if the scopes do not resolve
    /// - [`ReferenceError::Query`] if the fetch fails
    pub async fn load_all(&self, force: bool) -> Result<LoadOutcome, ReferenceError> {
        if !force {
            let last = *self.inner.last_loaded_at.lock();
            if last.is_some_and(|at| at.elapsed() < self.inner.config.reload_interval()) {
                return Ok(LoadOutcome::Fresh);
            }
        }

        let started = *self.inner.epoch.read();
        let response = self
            .inner
            .fetch(Value::Object(serde_json::Map::new()), force)
            .await?;

        let epoch = self.inner.epoch.read();
        if *epoch != started {
            return Err(ReferenceError::Reset);
        }
        let pending: Vec<String> = self
            .inner
            .holders
            .iter()
            .filter(|holder| !holder.value().borrow().is_terminal())
            .map(|holder| holder.key().clone())
            .collect();
        let loaded = self.inner.route(&response, pending.iter().map(String::as_str));
        {
            let mut parked = self.inner.parked.lock();
            for id in &pending {
                parked.remove(id);
            }
        }
        *self.inner.last_loaded_at.lock() = Some(Instant::now());
        debug!(path = %self.inner.source.path, loaded, "loaded full reference list");
        Ok(LoadOutcome::Loaded(loaded))
    }

    /// Forget every holder, pending id and load time
    ///
    /// Batches in flight when this is called are discarded on arrival, and
    /// waiters in [`resolve`](Self::resolve) receive [`ReferenceError::Reset`].
    pub fn reset(&self) {
        let mut epoch = self.inner.epoch.write();
        *epoch = epoch.wrapping_add(1);
        let dropped = self.batcher.cancel_pending();
        self.inner.holders.clear();
        self.inner.parked.lock().clear();
        *self.inner.last_loaded_at.lock() = None;
        drop(epoch);
        debug!(path = %self.inner.source.path, dropped = dropped.len(), "reference cache reset");
    }

    /// Flush pending ids now and wait for the batch
    pub async fn flush(&self) {
        self.batcher.flush_now().await;
    }

    /// Wait until no ids are pending or in flight
    pub async fn wait_idle(&self) {
        self.batcher.wait_idle().await;
    }

    /// Number of holders
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.holders.len()
    }

    /// No holders yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.holders.is_empty()
    }

    /// Holder counts by state
    #[must_use]
    pub fn stats(&self) -> ReferenceStats {
        let mut stats = ReferenceStats {
            batch: self.batcher.stats(),
            parked: self.inner.parked.lock().len(),
            ..ReferenceStats::default()
        };
        for holder in self.inner.holders.iter() {
            match &*holder.value().borrow() {
                EntryState::Pending => stats.pending += 1,
                EntryState::Resolved(_) => stats.resolved += 1,
                EntryState::Missing => stats.missing += 1,
                EntryState::Failed { .. } => stats.failed += 1,
            }
        }
        stats
    }
}

/// Type-erased view used to reset caches of different entity types together
pub trait ReferenceStore: Send + Sync {
    /// Resource path served
    fn path(&self) -> &ResourcePath;

    /// Forget everything (see [`ReferenceCache::reset`])
    fn reset(&self);

    /// Number of holders
    fn len(&self) -> usize;

    /// No holders
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R, D> ReferenceStore for ReferenceCache<R, D>
where
    R: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    fn path(&self) -> &ResourcePath {
        ReferenceCache::path(self)
    }

    fn reset(&self) {
        ReferenceCache::reset(self);
    }

    fn len(&self) -> usize {
        ReferenceCache::len(self)
    }
}
