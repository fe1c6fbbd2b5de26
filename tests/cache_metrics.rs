mod support;

use std::collections::HashSet;

use arbor::cache::CacheConfig;
use arbor::infra::memory::IndexFailure;
use metrics_util::debugging::DebuggingRecorder;

use support::Site;

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let site = Site::new().await;
    let arbitrator = site.indexed_arbitrator(&CacheConfig::default());
    let consumer = site.consumer(&arbitrator);

    // memoizer miss then hit
    arbitrator.resolve(42).await.expect("resolve");
    arbitrator.resolve(42).await.expect("resolve");

    // store fallback while the index is down
    site.index.fail_with(Some(IndexFailure::ReaderClosed));
    arbitrator.resolve(43).await.expect("resolve");
    site.index.fail_with(None);

    // queue length and consumer latency
    let about = site.repo.entity(42).await.expect("about");
    site.service.save(about, 7).await.expect("save");
    assert!(consumer.consume());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "arbor_cache_hit_total",
        "arbor_cache_miss_total",
        "arbor_index_fallback_total",
        "arbor_tree_change_queue_len",
        "arbor_cache_consume_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
