use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use scopecache_batch::{handler_fn, BatchConfig, BatchFetchError, BatchPhase, IdBatcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

type Calls = Arc<Mutex<Vec<Vec<String>>>>;

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

fn recording_batcher(config: BatchConfig) -> (IdBatcher, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let handler = handler_fn(move |ids: Vec<String>| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(ids);
            Ok::<(), BatchFetchError>(())
        }
    });
    (IdBatcher::new(config, handler).unwrap(), calls)
}

#[tokio::test(start_paused = true)]
async fn debounce_flushes_once_then_starts_new_batch() {
    let config = BatchConfig::new()
        .with_batch_size(3)
        .with_debounce(Duration::from_millis(50));
    let (batcher, calls) = recording_batcher(config);

    batcher.enqueue("a");
    batcher.enqueue("b");
    tokio::time::sleep(Duration::from_millis(49)).await;
    assert!(calls.lock().is_empty());

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(*calls.lock(), vec![ids(&["a", "b"])]);

    batcher.enqueue("a");
    tokio::time::sleep(Duration::from_millis(51)).await;
    assert_eq!(*calls.lock(), vec![ids(&["a", "b"]), ids(&["a"])]);
}

#[tokio::test(start_paused = true)]
async fn reaching_batch_size_flushes_without_waiting() {
    let config = BatchConfig::new()
        .with_batch_size(2)
        .with_debounce(Duration::from_secs(60));
    let (batcher, calls) = recording_batcher(config);

    batcher.enqueue("x");
    batcher.enqueue("y");
    // let the spawned flush run; no time passes
    tokio::task::yield_now().await;
    batcher.wait_idle().await;

    assert_eq!(*calls.lock(), vec![ids(&["x", "y"])]);
    assert_eq!(batcher.stats().flushes, 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_enqueue_is_deduplicated() {
    let (batcher, calls) = recording_batcher(BatchConfig::default());

    for _ in 0..10 {
        batcher.enqueue("metric-1");
    }
    batcher.enqueue("metric-2");
    batcher.wait_idle().await;

    assert_eq!(*calls.lock(), vec![ids(&["metric-1", "metric-2"])]);
}

#[tokio::test(start_paused = true)]
async fn ids_enqueued_during_flush_start_a_new_batch() {
    let gate = Arc::new(Notify::new());
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let gate = Arc::clone(&gate);
        let calls = Arc::clone(&calls);
        handler_fn(move |ids: Vec<String>| {
            let gate = Arc::clone(&gate);
            let calls = Arc::clone(&calls);
            async move {
                let first = calls.lock().is_empty();
                calls.lock().push(ids);
                if first {
                    gate.notified().await;
                }
                Ok::<(), BatchFetchError>(())
            }
        })
    };
    let config = BatchConfig::new()
        .with_batch_size(2)
        .with_debounce(Duration::from_millis(50));
    let batcher = IdBatcher::new(config, handler).unwrap();

    batcher.enqueue("a");
    batcher.enqueue("b");
    tokio::task::yield_now().await;
    assert_eq!(batcher.phase(), BatchPhase::Flushing);

    // "a" is no longer pending, so it is accepted into the new batch
    assert!(batcher.enqueue("a"));
    assert!(batcher.enqueue("c"));
    assert_eq!(batcher.pending_len(), 0, "size threshold flushed the second batch");
    tokio::task::yield_now().await;

    gate.notify_one();
    batcher.wait_idle().await;

    assert_eq!(*calls.lock(), vec![ids(&["a", "b"]), ids(&["a", "c"])]);
}

#[tokio::test(start_paused = true)]
async fn oversized_burst_is_split_by_max_batch_size() {
    let config = BatchConfig::new()
        .with_batch_size(2)
        .with_max_batch_size(3)
        .with_debounce(Duration::from_millis(50));
    let (batcher, calls) = recording_batcher(config);

    let added = batcher.enqueue_many(["1", "2", "3", "4", "5", "6", "7", ""]);
    assert_eq!(added, 7);
    batcher.wait_idle().await;

    assert_eq!(
        *calls.lock(),
        vec![ids(&["1", "2", "3"]), ids(&["4", "5", "6"]), ids(&["7"])]
    );
    let stats = batcher.stats();
    assert_eq!(stats.flushes, 1);
    assert_eq!(stats.calls, 3);
    assert_eq!(stats.ids_flushed, 7);
}

#[tokio::test(start_paused = true)]
async fn failed_batch_returns_to_idle() {
    let handler = handler_fn(|_ids: Vec<String>| async {
        Err::<(), _>(BatchFetchError::new("503 service unavailable"))
    });
    let batcher = IdBatcher::new(BatchConfig::default(), handler).unwrap();

    batcher.enqueue("a");
    batcher.wait_idle().await;
    assert_eq!(batcher.phase(), BatchPhase::Idle);
    assert_eq!(batcher.stats().failed_calls, 1);

    // the batcher holds no retry state: the same id is accepted again
    assert!(batcher.enqueue("a"));
}

#[test]
fn invalid_config_is_rejected() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let handler = handler_fn(|_ids: Vec<String>| async { Ok::<(), BatchFetchError>(()) });
    let result = IdBatcher::with_runtime(
        BatchConfig::new().with_batch_size(50).with_max_batch_size(10),
        handler,
        runtime.handle().clone(),
    );
    assert!(result.is_err());
}
