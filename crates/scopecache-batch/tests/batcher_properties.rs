use parking_lot::Mutex;
use proptest::prelude::*;
use scopecache_batch::{handler_fn, BatchConfig, BatchFetchError, IdBatcher};
use std::sync::Arc;

fn flush_all(batch_size: usize, max_batch_size: usize, enqueued: &[String]) -> Vec<Vec<String>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    runtime.block_on(async {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let handler = handler_fn(move |ids: Vec<String>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(ids);
                Ok::<(), BatchFetchError>(())
            }
        });
        let config = BatchConfig::new()
            .with_batch_size(batch_size)
            .with_max_batch_size(max_batch_size);
        let batcher = IdBatcher::new(config, handler).unwrap();
        for id in enqueued {
            batcher.enqueue(id);
        }
        batcher.flush_now().await;
        batcher.wait_idle().await;
        let recorded = calls.lock().clone();
        recorded
    })
}

fn first_seen(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

proptest! {
    #[test]
    fn every_distinct_id_is_delivered_once(
        enqueued in prop::collection::vec("[a-h]", 0..40),
    ) {
        let calls = flush_all(100, 100, &enqueued);
        let delivered: Vec<String> = calls.into_iter().flatten().collect();
        prop_assert_eq!(delivered, first_seen(&enqueued));
    }

    #[test]
    fn no_call_exceeds_the_ceiling(
        distinct in prop::collection::hash_set("[a-z]{1,3}", 0..80),
        batch_size in 1usize..10,
        extra in 0usize..10,
    ) {
        let max_batch_size = batch_size + extra;
        let enqueued: Vec<String> = distinct.into_iter().collect();
        let calls = flush_all(batch_size, max_batch_size, &enqueued);
        prop_assert!(calls.iter().all(|call| !call.is_empty() && call.len() <= max_batch_size));

        let mut delivered: Vec<String> = calls.into_iter().flatten().collect();
        let mut expected = enqueued;
        delivered.sort();
        expected.sort();
        prop_assert_eq!(delivered, expected);
    }
}
