//! Scoped queries
//!
//! A [`ScopedQuery`] is one observer of one cache slot. The slot's key is
//! derived from the query's [`KeySpec`] and required scope tokens; while a
//! token is unresolved, the grant scope does not match, or the context is
//! still loading, the query is disabled: it never calls its fetcher and
//! reports no error.
//!
//! Observers apply a response only while their current key still equals the
//! key the response was fetched for.

use crate::client::QueryClient;
use crate::error::QueryError;
use crate::policy::CachePolicy;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use scopecache_key::{KeyError, KeySpec, QueryKey, ScopeToken};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// What a fetcher receives
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    /// Key the result will be stored under
    pub key: QueryKey,
    /// Request parameters
    pub params: Value,
}

/// Shared async fetcher
pub type QueryFn<T> =
    Arc<dyn Fn(QueryContext) -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync>;

type Projection<T, U> = Arc<dyn Fn(&Arc<T>) -> Arc<U> + Send + Sync>;

/// Options for [`QueryClient::run`]
pub struct QueryOptions<T, U = T> {
    /// Key description (path, params, entity, deps)
    pub key: KeySpec,
    /// Fetcher invoked on a miss
    pub query_fn: QueryFn<T>,
    /// Overrides the client's stale time
    pub stale_time: Option<Duration>,
    /// Overrides the client's gc time
    pub gc_time: Option<Duration>,
    /// Caller-side switch, combined with the scope gate
    pub enabled: bool,
    select: Projection<T, U>,
}

impl<T: Send + Sync + 'static> QueryOptions<T, T> {
    /// Options for `key` fetched by `query_fn`
    pub fn new<F, Fut>(key: KeySpec, fetch: F) -> Self
    where
        F: Fn(QueryContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let query_fn: QueryFn<T> = Arc::new(
            move |ctx: QueryContext| -> BoxFuture<'static, Result<T, QueryError>> {
                Box::pin(fetch(ctx))
            },
        );
        Self {
            key,
            query_fn,
            stale_time: None,
            gc_time: None,
            enabled: true,
            select: Arc::new(|raw: &Arc<T>| Arc::clone(raw)),
        }
    }

    /// Project the raw response with `select`
    ///
    /// The projection reruns only when the raw response changes, so repeated
    /// reads of the same response return the same `Arc`.
    pub fn with_select<V, F>(self, select: F) -> QueryOptions<T, V>
    where
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        QueryOptions {
            key: self.key,
            query_fn: self.query_fn,
            stale_time: self.stale_time,
            gc_time: self.gc_time,
            enabled: self.enabled,
            select: Arc::new(move |raw: &Arc<T>| Arc::new(select(raw))),
        }
    }
}

impl<T, U> QueryOptions<T, U> {
    /// With stale time
    #[must_use]
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    /// With gc time
    #[must_use]
    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = Some(gc_time);
        self
    }

    /// With caller-side enabled flag
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl<T, U> fmt::Debug for QueryOptions<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("key", &self.key)
            .field("stale_time", &self.stale_time)
            .field("gc_time", &self.gc_time)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Why a query is not running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisabledReason {
    /// The caller set `enabled = false`
    Manual,
    /// The application context is still loading
    NotReady,
    /// The grant scope is required but not known yet
    GrantUnknown,
    /// The query declared no scope tokens
    NoScopes,
    /// The current grant scope is not among the required tokens
    ScopeNotGranted {
        /// Current grant scope
        grant: ScopeToken,
    },
    /// A required token has no current value
    ScopeUnresolved {
        /// The unresolved token
        token: ScopeToken,
    },
}

impl DisabledReason {
    /// Map a "not ready" key error to its reason
    #[must_use]
    pub fn from_key_error(err: &KeyError) -> Option<Self> {
        match err {
            KeyError::NotReady => Some(Self::NotReady),
            KeyError::GrantUnknown => Some(Self::GrantUnknown),
            KeyError::NoScopes => Some(Self::NoScopes),
            KeyError::ScopeNotGranted { grant, .. } => Some(Self::ScopeNotGranted { grant: *grant }),
            KeyError::ScopeUnresolved { token } => Some(Self::ScopeUnresolved { token: *token }),
            _ => None,
        }
    }
}

/// Lifecycle of an observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    /// Will not fetch
    Disabled(DisabledReason),
    /// No data for the current key yet
    Pending,
    /// Data for the current key is available
    Success,
    /// The last fetch for the current key failed
    Error,
}

/// Observer snapshot
pub struct QueryResult<U> {
    /// Projected data for the current key
    pub data: Option<Arc<U>>,
    /// Lifecycle status
    pub status: QueryStatus,
    /// A request for the current key is in flight
    pub is_fetching: bool,
    /// Last error for the current key
    pub error: Option<QueryError>,
    /// Current key, absent while disabled by scope
    pub key: Option<QueryKey>,
}

impl<U> QueryResult<U> {
    /// No data yet and a request is in flight
    #[inline]
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.is_fetching
    }

    /// Data is available
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// The last fetch failed
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// The query will not fetch
    #[inline]
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self.status, QueryStatus::Disabled(_))
    }
}

impl<U> Clone for QueryResult<U> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            status: self.status.clone(),
            is_fetching: self.is_fetching,
            error: self.error.clone(),
            key: self.key.clone(),
        }
    }
}

impl<U: fmt::Debug> fmt::Debug for QueryResult<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("data", &self.data)
            .field("status", &self.status)
            .field("is_fetching", &self.is_fetching)
            .field("error", &self.error)
            .field("key", &self.key.as_ref().map(ToString::to_string))
            .finish()
    }
}

enum Gate {
    Disabled(DisabledReason),
    Failed(QueryError),
}

struct ObserverState<T, U> {
    spec: KeySpec,
    enabled: bool,
    key: Option<QueryKey>,
    raw: Option<Arc<T>>,
    selected: Option<Arc<U>>,
    status: QueryStatus,
    error: Option<QueryError>,
    in_flight: usize,
}

impl<T, U> ObserverState<T, U> {
    fn snapshot(&self) -> QueryResult<U> {
        QueryResult {
            data: self.selected.clone(),
            status: self.status.clone(),
            is_fetching: self.in_flight > 0,
            error: self.error.clone(),
            key: self.key.clone(),
        }
    }

    /// Point the observer at `key`, dropping data that belongs to another key
    fn retarget(&mut self, key: Option<QueryKey>) {
        if self.key == key {
            return;
        }
        self.key = key;
        self.raw = None;
        self.selected = None;
        self.error = None;
        self.in_flight = 0;
        self.status = QueryStatus::Pending;
    }
}

struct Inner<T, U> {
    client: QueryClient,
    query_fn: QueryFn<T>,
    select: Projection<T, U>,
    stale_time: Option<Duration>,
    gc_time: Option<Duration>,
    scopes: Vec<ScopeToken>,
    state: Mutex<ObserverState<T, U>>,
    tx: watch::Sender<QueryResult<U>>,
}

/// One observer of a scope-keyed cache slot
pub struct ScopedQuery<T, U = T> {
    inner: Arc<Inner<T, U>>,
}

impl<T, U> Clone for ScopedQuery<T, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, U> fmt::Debug for ScopedQuery<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ScopedQuery")
            .field("scopes", &self.inner.scopes)
            .field("spec", &state.spec)
            .field("status", &state.status)
            .finish_non_exhaustive()
    }
}

impl<T, U> ScopedQuery<T, U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    pub(crate) fn new(client: QueryClient, options: QueryOptions<T, U>, scopes: &[ScopeToken]) -> Self {
        let mut state = ObserverState {
            spec: options.key,
            enabled: options.enabled,
            key: None,
            raw: None,
            selected: None,
            status: QueryStatus::Pending,
            error: None,
            in_flight: 0,
        };
        let gate = gate(&client, scopes, &state.spec, state.enabled);
        apply_gate(&mut state, gate);
        let (tx, _) = watch::channel(state.snapshot());

        Self {
            inner: Arc::new(Inner {
                client,
                query_fn: options.query_fn,
                select: options.select,
                stale_time: options.stale_time,
                gc_time: options.gc_time,
                scopes: scopes.to_vec(),
                state: Mutex::new(state),
                tx,
            }),
        }
    }

    /// Required scope tokens
    #[inline]
    #[must_use]
    pub fn scopes(&self) -> &[ScopeToken] {
        &self.inner.scopes
    }

    /// Effective cache policy
    #[must_use]
    pub fn policy(&self) -> CachePolicy {
        let mut policy = self.inner.client.policy();
        if let Some(stale_time) = self.inner.stale_time {
            policy.stale_time = stale_time;
        }
        if let Some(gc_time) = self.inner.gc_time {
            policy.gc_time = gc_time;
        }
        policy
    }

    /// Current key spec
    #[must_use]
    pub fn key_spec(&self) -> KeySpec {
        self.inner.state.lock().spec.clone()
    }

    /// Current key, if the query is enabled
    #[must_use]
    pub fn key(&self) -> Option<QueryKey> {
        self.inner.state.lock().key.clone()
    }

    /// Latest snapshot
    #[must_use]
    pub fn snapshot(&self) -> QueryResult<U> {
        self.inner.tx.borrow().clone()
    }

    /// Receive every new snapshot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<QueryResult<U>> {
        self.inner.tx.subscribe()
    }

    /// Replace the key spec
    ///
    /// Data cached for the previous key stays in the cache but is no longer
    /// reported by this observer.
    pub fn set_key_spec(&self, spec: KeySpec) {
        self.update(|state| state.spec = spec);
    }

    /// Replace the request parameters
    pub fn set_params(&self, params: Value) {
        self.update(|state| state.spec.params = params);
    }

    /// Toggle the caller-side enabled flag
    pub fn set_enabled(&self, enabled: bool) {
        self.update(|state| state.enabled = enabled);
    }

    /// Re-evaluate the scope gate (e.g. after a workspace switch)
    pub fn refresh_gate(&self) {
        self.update(|_| {});
    }

    fn update(&self, change: impl FnOnce(&mut ObserverState<T, U>)) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            change(&mut state);
            let gate = gate(&self.inner.client, &self.inner.scopes, &state.spec, state.enabled);
            apply_gate(&mut state, gate);
            state.snapshot()
        };
        self.inner.tx.send_replace(snapshot);
    }

    /// Serve from a fresh cache slot or fetch
    pub async fn fetch(&self) -> QueryResult<U> {
        self.execute(false).await
    }

    /// Fetch even if the cache slot is fresh
    pub async fn refetch(&self) -> QueryResult<U> {
        self.execute(true).await
    }

    async fn execute(&self, force: bool) -> QueryResult<U> {
        let (key, params, snapshot) = {
            let mut state = self.inner.state.lock();
            let gate = gate(&self.inner.client, &self.inner.scopes, &state.spec, state.enabled);
            let key = match gate {
                Ok(key) => key,
                Err(gate) => {
                    apply_gate(&mut state, Err(gate));
                    let snapshot = state.snapshot();
                    drop(state);
                    if let QueryStatus::Disabled(reason) = &snapshot.status {
                        debug!(?reason, "query disabled, skipping fetch");
                    }
                    self.inner.tx.send_replace(snapshot.clone());
                    return snapshot;
                }
            };
            state.retarget(Some(key.clone()));
            if matches!(state.status, QueryStatus::Disabled(_)) {
                state.status = QueryStatus::Pending;
            }
            state.in_flight += 1;
            (key, state.spec.params.clone(), state.snapshot())
        };
        self.inner.tx.send_replace(snapshot);

        let cache = self.inner.client.cache();
        let policy = self.policy();
        let query_fn = Arc::clone(&self.inner.query_fn);
        let ctx = QueryContext {
            key: key.clone(),
            params,
        };
        let fetch = move || query_fn(ctx);
        let result = if force {
            cache.fetch(&key, policy, fetch).await
        } else {
            cache.get_or_fetch(&key, policy, fetch).await
        };
        self.apply(&key, result)
    }

    fn apply(&self, key: &QueryKey, result: Result<Arc<T>, QueryError>) -> QueryResult<U> {
        let snapshot = {
            let mut state = self.inner.state.lock();
            if state.key.as_ref() != Some(key) {
                debug!(%key, "ignoring response for superseded key");
                return state.snapshot();
            }
            state.in_flight = state.in_flight.saturating_sub(1);
            match result {
                Ok(raw) => {
                    let reuse = state
                        .raw
                        .as_ref()
                        .is_some_and(|previous| Arc::ptr_eq(previous, &raw));
                    if !reuse || state.selected.is_none() {
                        state.selected = Some((self.inner.select)(&raw));
                    }
                    state.raw = Some(raw);
                    state.status = QueryStatus::Success;
                    state.error = None;
                }
                // discarded by a reset; a later fetch repopulates
                Err(QueryError::Cancelled) => {}
                Err(err) => {
                    warn!(%key, error = %err, "query failed");
                    state.status = QueryStatus::Error;
                    state.error = Some(err);
                }
            }
            state.snapshot()
        };
        self.inner.tx.send_replace(snapshot.clone());
        snapshot
    }
}

fn gate(
    client: &QueryClient,
    scopes: &[ScopeToken],
    spec: &KeySpec,
    enabled: bool,
) -> Result<QueryKey, Gate> {
    if !enabled {
        return Err(Gate::Disabled(DisabledReason::Manual));
    }
    match client.keys().build_checked(scopes, spec) {
        Ok(key) => Ok(key),
        Err(err) => match DisabledReason::from_key_error(&err) {
            Some(DisabledReason::NoScopes) => {
                warn!(path = %spec.path, "query declares no scope tokens");
                Err(Gate::Disabled(DisabledReason::NoScopes))
            }
            Some(reason) => Err(Gate::Disabled(reason)),
            None => Err(Gate::Failed(QueryError::Key(err))),
        },
    }
}

fn apply_gate<T, U>(state: &mut ObserverState<T, U>, gate: Result<QueryKey, Gate>) {
    match gate {
        Ok(key) => {
            state.retarget(Some(key));
            if matches!(state.status, QueryStatus::Disabled(_)) {
                state.status = if state.selected.is_some() {
                    QueryStatus::Success
                } else {
                    QueryStatus::Pending
                };
            }
        }
        // same key, just switched off: keep what is shown
        Err(Gate::Disabled(DisabledReason::Manual)) => {
            state.in_flight = 0;
            state.status = QueryStatus::Disabled(DisabledReason::Manual);
        }
        Err(Gate::Disabled(reason)) => {
            state.retarget(None);
            state.status = QueryStatus::Disabled(reason);
        }
        Err(Gate::Failed(err)) => {
            state.retarget(None);
            state.status = QueryStatus::Error;
            state.error = Some(err);
        }
    }
}
