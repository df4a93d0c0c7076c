//! Testing utilities for the scopecache workspace
//!
//! Shared fakes (scope resolver, batch handler, list fetcher) and fixtures.

#![allow(missing_docs)]

use parking_lot::{Mutex, RwLock};
use scopecache_batch::{BatchFetchError, BatchHandler};
use scopecache_key::{ScopeResolver, ScopeToken};
use scopecache_query::{ListFetcher, ListResponse, QueryError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Resolver whose values tests can change at any time
#[derive(Debug)]
pub struct StaticScopeResolver {
    values: RwLock<HashMap<ScopeToken, String>>,
    grant: RwLock<Option<ScopeToken>>,
    grant_required: AtomicBool,
    ready: AtomicBool,
}

impl Default for StaticScopeResolver {
    fn default() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            grant: RwLock::new(None),
            grant_required: AtomicBool::new(false),
            ready: AtomicBool::new(true),
        }
    }
}

impl StaticScopeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Domain `domain-1`, workspace `ws-1`, user `user-1`
    pub fn workspace(workspace: &str) -> Arc<Self> {
        Arc::new(
            Self::new()
                .with_scope(ScopeToken::Domain, "domain-1")
                .with_scope(ScopeToken::Workspace, workspace)
                .with_scope(ScopeToken::User, "user-1"),
        )
    }

    pub fn with_scope(self, token: ScopeToken, value: &str) -> Self {
        self.set_scope(token, value);
        self
    }

    pub fn set_scope(&self, token: ScopeToken, value: &str) {
        self.values.write().insert(token, value.to_string());
    }

    pub fn clear_scope(&self, token: ScopeToken) {
        self.values.write().remove(&token);
    }

    pub fn set_grant(&self, grant: Option<ScopeToken>) {
        *self.grant.write() = grant;
    }

    pub fn set_requires_grant(&self, required: bool) {
        self.grant_required.store(required, Ordering::SeqCst);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl ScopeResolver for StaticScopeResolver {
    fn resolve(&self, token: ScopeToken) -> Option<String> {
        self.values.read().get(&token).cloned()
    }

    fn grant_scope(&self) -> Option<ScopeToken> {
        *self.grant.read()
    }

    fn requires_grant(&self) -> bool {
        self.grant_required.load(Ordering::SeqCst)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Batch handler that records every batch
#[derive(Debug, Default)]
pub struct RecordingBatchHandler {
    calls: Mutex<Vec<Vec<String>>>,
    fail: AtomicBool,
    notify: Notify,
}

impl RecordingBatchHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Wait until at least `n` batches were received (panics after 5s)
    pub async fn wait_for_calls(&self, n: usize) {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.call_count() >= n {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("timed out waiting for batch calls");
    }
}

#[async_trait::async_trait]
impl BatchHandler for RecordingBatchHandler {
    async fn on_batch_ready(&self, ids: Vec<String>) -> Result<(), BatchFetchError> {
        self.calls.lock().push(ids);
        self.notify.notify_waiters();
        if self.fail.load(Ordering::SeqCst) {
            Err(BatchFetchError::new("recording handler set to fail"))
        } else {
            Ok(())
        }
    }
}

/// In-memory list endpoint
///
/// Understands `{"k": field, "v": [..], "o": "in"}` filters under
/// `params.query.filter` and `params.query.page`; records every call.
pub struct MockListFetcher<E> {
    items: RwLock<Vec<E>>,
    calls: Mutex<Vec<Value>>,
    fail: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl<E: Serialize + Clone + Send + Sync + 'static> MockListFetcher<E> {
    pub fn new(items: Vec<E>) -> Arc<Self> {
        Arc::new(Self {
            items: RwLock::new(items),
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            gate: Mutex::new(None),
        })
    }

    pub fn set_items(&self, items: Vec<E>) {
        *self.items.write() = items;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Hold every call until the returned notify fires
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.notify_waiters();
        }
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn matches(item: &Value, filters: &[Value]) -> bool {
        filters.iter().all(|filter| {
            let field = filter["k"].as_str().unwrap_or_default();
            match (filter["o"].as_str(), &filter["v"]) {
                (Some("in"), Value::Array(values)) => values.contains(&item[field]),
                (Some("eq"), expected) => &item[field] == expected,
                _ => true,
            }
        })
    }
}

#[async_trait::async_trait]
impl<E: Serialize + Clone + Send + Sync + 'static> ListFetcher<E> for MockListFetcher<E> {
    async fn list(&self, params: Value) -> Result<ListResponse<E>, QueryError> {
        self.calls.lock().push(params.clone());
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(QueryError::transport("mock fetcher set to fail"));
        }

        let filters = params["query"]["filter"].as_array().cloned().unwrap_or_default();
        let matching: Vec<E> = self
            .items
            .read()
            .iter()
            .filter(|item| {
                let value = serde_json::to_value(item).unwrap_or(Value::Null);
                Self::matches(&value, &filters)
            })
            .cloned()
            .collect();
        let total = matching.len() as u64;

        let page = &params["query"]["page"];
        let results = match (page["start"].as_u64(), page["limit"].as_u64()) {
            (Some(start), Some(limit)) => matching
                .into_iter()
                .skip(start.saturating_sub(1) as usize)
                .take(limit as usize)
                .collect(),
            _ => matching,
        };
        Ok(ListResponse::new(results, total))
    }
}

/// Cost metric reference entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub metric_id: String,
    pub name: String,
    pub unit: String,
}

impl Metric {
    pub fn new(metric_id: &str, name: &str) -> Self {
        Self {
            metric_id: metric_id.to_string(),
            name: name.to_string(),
            unit: "USD".to_string(),
        }
    }
}

pub fn sample_metrics() -> Vec<Metric> {
    vec![
        Metric::new("metric-1", "Cost"),
        Metric::new("metric-2", "Usage"),
        Metric::new("metric-3", "Savings"),
    ]
}

pub fn sample_projects() -> Vec<Value> {
    vec![
        json!({"project_id": "p-1", "name": "Project A", "workspace_id": "ws-1"}),
        json!({"project_id": "p-2", "name": "Project B", "workspace_id": "ws-1"}),
        json!({"project_id": "p-3", "name": "Project C", "workspace_id": "ws-2"}),
    ]
}
