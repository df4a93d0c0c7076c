//! End-to-end reference cache scenarios over a mock list endpoint

use pretty_assertions::assert_eq;
use scopecache_batch::BatchConfig;
use scopecache_key::{ResourcePath, ScopeToken};
use scopecache_query::{ListFetcher, QueryClient};
use scopecache_reference::{
    EntryState, LoadOutcome, ReferenceCache, ReferenceConfig, ReferenceError, ReferenceItem,
    ReferenceSource, ReferenceStore,
};
use scopecache_test_utils::{sample_metrics, Metric, MockListFetcher, StaticScopeResolver};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(300);

fn metric_item(raw: &Metric) -> ReferenceItem<Metric> {
    ReferenceItem::named(raw.metric_id.clone(), raw.name.clone(), raw.clone())
}

fn metrics_cache(
    resolver: Arc<StaticScopeResolver>,
    fetcher: &Arc<MockListFetcher<Metric>>,
) -> ReferenceCache<Metric, Metric> {
    let source = ReferenceSource::new(
        ResourcePath::new("cost_analysis", "metric", "list"),
        "metric_id",
        &[ScopeToken::Workspace],
        Arc::clone(fetcher) as Arc<dyn ListFetcher<Metric>>,
    );
    ReferenceCache::new(
        QueryClient::new(resolver),
        source,
        metric_item,
        BatchConfig::default(),
        ReferenceConfig::default(),
    )
    .unwrap()
}

async fn past_debounce() {
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn unseen_id_is_fetched_once_and_then_served() {
    let fetcher = MockListFetcher::new(sample_metrics());
    let cache = metrics_cache(StaticScopeResolver::workspace("ws-1"), &fetcher);

    assert!(cache.get("metric-1").is_none());
    assert_eq!(cache.batcher().pending_len(), 1);
    assert!(matches!(cache.state("metric-1"), Some(EntryState::Pending)));

    past_debounce().await;
    cache.wait_idle().await;

    let item = cache.get("metric-1").unwrap();
    assert_eq!(
        *item,
        ReferenceItem {
            key: "metric-1".to_string(),
            label: "Cost".to_string(),
            name: "Cost".to_string(),
            data: Metric::new("metric-1", "Cost"),
        }
    );
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(
        fetcher.calls()[0],
        json!({"query": {"filter": [{"k": "metric_id", "v": ["metric-1"], "o": "in"}]}})
    );
}

#[tokio::test(start_paused = true)]
async fn reads_in_one_window_share_a_batch() {
    let fetcher = MockListFetcher::new(sample_metrics());
    let cache = metrics_cache(StaticScopeResolver::workspace("ws-1"), &fetcher);

    for id in ["metric-2", "metric-1", "metric-2", "metric-1"] {
        assert!(cache.get(id).is_none());
    }
    assert_eq!(cache.batcher().pending_len(), 2);

    past_debounce().await;
    cache.wait_idle().await;

    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(
        fetcher.calls()[0]["query"]["filter"][0]["v"],
        json!(["metric-2", "metric-1"])
    );
    assert_eq!(cache.get("metric-2").unwrap().label, "Usage");
    assert_eq!(cache.get("metric-1").unwrap().label, "Cost");
    assert_eq!(cache.resolved().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn id_absent_from_response_is_missing_and_not_refetched() {
    let fetcher = MockListFetcher::new(sample_metrics());
    let cache = metrics_cache(StaticScopeResolver::workspace("ws-1"), &fetcher);

    assert_eq!(cache.resolve("metric-9").await.unwrap(), None);
    assert!(matches!(cache.state("metric-9"), Some(EntryState::Missing)));

    assert!(cache.get("metric-9").is_none());
    assert_eq!(cache.batcher().pending_len(), 0);

    past_debounce().await;
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(cache.stats().missing, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_id_is_retried_only_after_cooldown() {
    let fetcher = MockListFetcher::new(sample_metrics());
    let cache = metrics_cache(StaticScopeResolver::workspace("ws-1"), &fetcher);

    fetcher.set_failing(true);
    let err = cache.resolve("metric-1").await.unwrap_err();
    assert!(matches!(err, ReferenceError::Fetch(_)));
    assert!(matches!(cache.state("metric-1"), Some(EntryState::Failed { .. })));

    fetcher.set_failing(false);
    assert!(cache.get("metric-1").is_none());
    assert_eq!(cache.batcher().pending_len(), 0);

    tokio::time::advance(ReferenceConfig::default().retry_cooldown()).await;
    assert!(cache.get("metric-1").is_none());
    assert_eq!(cache.batcher().pending_len(), 1);

    let item = cache.resolve("metric-1").await.unwrap().unwrap();
    assert_eq!(item.name, "Cost");
    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(cache.stats().batch.failed_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn id_read_before_workspace_is_selected_resolves_once_it_is() {
    let fetcher = MockListFetcher::new(sample_metrics());
    let resolver = Arc::new(StaticScopeResolver::new());
    let cache = metrics_cache(Arc::clone(&resolver), &fetcher);

    let waiter = tokio::spawn({
        let cache = cache.clone();
        async move { cache.resolve("metric-1").await }
    });
    past_debounce().await;
    cache.wait_idle().await;

    assert!(matches!(cache.state("metric-1"), Some(EntryState::Pending)));
    let stats = cache.stats();
    assert_eq!((stats.parked, stats.failed, stats.batch.failed_calls), (1, 0, 0));
    assert_eq!(fetcher.call_count(), 0);
    assert!(!waiter.is_finished());

    resolver.set_scope(ScopeToken::Workspace, "ws-1");
    assert!(cache.get("metric-1").is_none());
    assert_eq!(cache.batcher().pending_len(), 1);

    past_debounce().await;
    cache.wait_idle().await;
    assert_eq!(cache.get("metric-1").unwrap().label, "Cost");
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(cache.stats().parked, 0);
    assert_eq!(waiter.await.unwrap().unwrap().unwrap().name, "Cost");
}

#[tokio::test(start_paused = true)]
async fn load_all_fills_every_holder_and_respects_reload_interval() {
    let fetcher = MockListFetcher::new(sample_metrics());
    let cache = metrics_cache(StaticScopeResolver::workspace("ws-1"), &fetcher);

    assert!(cache.get("metric-404").is_none());
    assert_eq!(cache.load_all(false).await.unwrap(), LoadOutcome::Loaded(3));
    assert!(matches!(cache.state("metric-404"), Some(EntryState::Missing)));
    assert_eq!(cache.get("metric-3").unwrap().label, "Savings");
    assert_eq!(fetcher.calls()[0], json!({}));

    assert_eq!(cache.load_all(false).await.unwrap(), LoadOutcome::Fresh);

    tokio::time::advance(ReferenceConfig::default().reload_interval()).await;
    fetcher.set_items(vec![Metric::new("metric-1", "Total cost")]);
    assert_eq!(cache.load_all(false).await.unwrap(), LoadOutcome::Loaded(1));
    assert_eq!(cache.get("metric-1").unwrap().label, "Total cost");

    assert_eq!(cache.load_all(true).await.unwrap(), LoadOutcome::Loaded(1));
}

#[tokio::test(start_paused = true)]
async fn reset_discards_batches_in_flight() {
    let fetcher = MockListFetcher::new(sample_metrics());
    let cache = metrics_cache(StaticScopeResolver::workspace("ws-1"), &fetcher);
    let gate = fetcher.hold();

    assert!(cache.get("metric-1").is_none());
    let waiter = tokio::spawn({
        let cache = cache.clone();
        async move { cache.resolve("metric-1").await }
    });

    past_debounce().await;
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(cache.batcher().in_flight(), 1);

    ReferenceStore::reset(&cache);
    assert!(cache.is_empty());
    assert_eq!(waiter.await.unwrap(), Err(ReferenceError::Reset));

    gate.notify_waiters();
    cache.wait_idle().await;
    assert!(cache.state("metric-1").is_none());
    assert!(cache.resolved().is_empty());
}
