//! Scope gating, pagination and invalidation against a mock list endpoint

use pretty_assertions::assert_eq;
use scopecache_key::{KeySpec, ResourcePath, ScopeResolver, ScopeToken};
use scopecache_query::{
    DisabledReason, ListFetcher, ListResponse, PageOptions, QueryClient, QueryContext,
    QueryOptions, QueryStatus, TotalCount,
};
use scopecache_test_utils::{sample_projects, MockListFetcher, StaticScopeResolver};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn project_options(
    mock: &Arc<MockListFetcher<Value>>,
    params: Value,
) -> QueryOptions<ListResponse<Value>> {
    let fetcher = Arc::clone(mock) as Arc<dyn ListFetcher<Value>>;
    let spec = KeySpec::new(ResourcePath::new("identity", "project", "list")).with_params(params);
    QueryOptions::new(spec, move |ctx: QueryContext| {
        let fetcher = Arc::clone(&fetcher);
        async move { fetcher.list(ctx.params).await }
    })
}

fn many_projects(n: usize) -> Vec<Value> {
    (1..=n)
        .map(|i| json!({"project_id": format!("p-{i}"), "name": format!("Project {i}"), "workspace_id": "ws-1"}))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn query_waits_for_workspace_then_fetches() {
    let resolver = Arc::new(StaticScopeResolver::new().with_scope(ScopeToken::Domain, "domain-1"));
    let client = QueryClient::new(Arc::clone(&resolver) as Arc<dyn ScopeResolver>);
    let mock = MockListFetcher::new(sample_projects());
    let query = client.run(project_options(&mock, json!({})), &[ScopeToken::Workspace]);

    let result = query.fetch().await;
    assert_eq!(
        result.status,
        QueryStatus::Disabled(DisabledReason::ScopeUnresolved {
            token: ScopeToken::Workspace
        })
    );
    assert!(result.key.is_none());
    assert_eq!(mock.call_count(), 0);

    resolver.set_scope(ScopeToken::Workspace, "ws-1");
    let result = query.fetch().await;
    assert_eq!(result.status, QueryStatus::Success);
    assert_eq!(result.data.unwrap().results.len(), 3);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn strict_resolver_waits_for_the_grant_scope() {
    let resolver = StaticScopeResolver::workspace("ws-1");
    resolver.set_requires_grant(true);
    let client = QueryClient::new(Arc::clone(&resolver) as Arc<dyn ScopeResolver>);
    let mock = MockListFetcher::new(sample_projects());
    let query = client.run(project_options(&mock, json!({})), &[ScopeToken::Workspace]);

    let result = query.fetch().await;
    assert_eq!(result.status, QueryStatus::Disabled(DisabledReason::GrantUnknown));
    assert!(result.error.is_none());
    assert_eq!(mock.call_count(), 0);

    resolver.set_grant(Some(ScopeToken::Workspace));
    assert_eq!(query.fetch().await.status, QueryStatus::Success);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn switching_workspace_switches_the_cache_slot() {
    let resolver = StaticScopeResolver::workspace("ws-1");
    let client = QueryClient::new(Arc::clone(&resolver) as Arc<dyn ScopeResolver>);
    let mock = MockListFetcher::new(sample_projects());
    let query = client.run(
        project_options(&mock, json!({})).with_stale_time(Duration::from_secs(60)),
        &[ScopeToken::Workspace],
    );

    let first = query.fetch().await;
    let first_key = first.key.clone().unwrap();

    resolver.set_scope(ScopeToken::Workspace, "ws-2");
    let second = query.fetch().await;
    assert_ne!(second.key.clone().unwrap(), first_key);
    assert_eq!(mock.call_count(), 2);

    resolver.set_scope(ScopeToken::Workspace, "ws-1");
    let third = query.fetch().await;
    assert_eq!(third.key.unwrap(), first_key);
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn pages_have_their_own_slots_and_are_reused_while_fresh() {
    let client = QueryClient::new(StaticScopeResolver::workspace("ws-1"));
    let mock = MockListFetcher::new(many_projects(25));
    let paged = client.paginate(
        project_options(&mock, json!({"query": {}})).with_stale_time(Duration::from_secs(60)),
        PageOptions::new(1, 10),
        &[ScopeToken::Workspace],
    );

    let page_one = paged.fetch().await;
    assert_eq!(page_one.data().unwrap().results[0]["project_id"], "p-1");
    assert_eq!(page_one.total_count, TotalCount::Known(25));
    let key_one = page_one.query.key.clone().unwrap();

    paged.set_page(2);
    let page_two = paged.fetch().await;
    assert_eq!(page_two.data().unwrap().results[0]["project_id"], "p-11");
    assert_ne!(page_two.query.key.clone().unwrap(), key_one);
    assert_eq!(mock.call_count(), 2);
    assert_eq!(mock.calls()[1]["query"]["page"], json!({"start": 11, "limit": 10}));

    paged.set_page(1);
    let again = paged.fetch().await;
    assert_eq!(again.query.key.clone().unwrap(), key_one);
    assert_eq!(again.data().unwrap().results[0]["project_id"], "p-1");
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_page_is_refetched() {
    let client = QueryClient::new(StaticScopeResolver::workspace("ws-1"));
    let mock = MockListFetcher::new(many_projects(5));
    let paged = client.paginate(
        project_options(&mock, json!({})).with_stale_time(Duration::from_secs(60)),
        PageOptions::default(),
        &[ScopeToken::Workspace],
    );

    paged.fetch().await;
    tokio::time::advance(Duration::from_secs(61)).await;
    paged.fetch().await;
    assert_eq!(mock.call_count(), 2);

    paged.refetch().await;
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn concurrent_observers_share_one_request() {
    let client = QueryClient::new(StaticScopeResolver::workspace("ws-1"));
    let mock = MockListFetcher::new(sample_projects());
    let gate = mock.hold();

    let first = client.run(project_options(&mock, json!({})), &[ScopeToken::Workspace]);
    let second = client.run(project_options(&mock, json!({})), &[ScopeToken::Workspace]);

    let a = tokio::spawn(async move { first.fetch().await });
    let b = tokio::spawn(async move { second.fetch().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(mock.call_count(), 1);

    gate.notify_waiters();
    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(Arc::ptr_eq(&a.data.unwrap(), &b.data.unwrap()));
    assert_eq!(client.cache().stats().coalesced, 1);
}

#[tokio::test(start_paused = true)]
async fn invalidate_resource_drops_every_slot_of_the_resource() {
    let client = QueryClient::new(StaticScopeResolver::workspace("ws-1"));
    let mock = MockListFetcher::new(many_projects(25));
    let paged = client.paginate(
        project_options(&mock, json!({})).with_stale_time(Duration::from_secs(60)),
        PageOptions::new(1, 10),
        &[ScopeToken::Workspace],
    );
    paged.fetch().await;
    paged.set_page(2);
    paged.fetch().await;
    client.cache().run_pending_tasks().await;

    let dropped = client
        .invalidate_resource(&[ScopeToken::Workspace], "identity", "project")
        .await
        .unwrap();
    assert_eq!(dropped, 2);

    paged.fetch().await;
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_reports_error_and_is_not_cached() {
    let client = QueryClient::new(StaticScopeResolver::workspace("ws-1"));
    let mock = MockListFetcher::new(sample_projects());
    let query = client.run(
        project_options(&mock, json!({})).with_stale_time(Duration::from_secs(60)),
        &[ScopeToken::Workspace],
    );

    mock.set_failing(true);
    let failed = query.fetch().await;
    assert_eq!(failed.status, QueryStatus::Error);
    assert!(failed.error.is_some());

    mock.set_failing(false);
    let ok = query.fetch().await;
    assert_eq!(ok.status, QueryStatus::Success);
    assert!(ok.error.is_none());
    assert_eq!(mock.call_count(), 2);
}
