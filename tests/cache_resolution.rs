mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arbor::cache::{CacheConfig, CacheValues, Memoizer, SourceArbitrator};
use arbor::domain::types::Provenance;
use arbor::infra::memory::IndexFailure;

use support::Site;

#[tokio::test]
async fn index_and_store_agree_on_published_nodes() {
    let site = Site::new().await;
    let config = CacheConfig::default();

    let from_index = site
        .indexed_arbitrator(&config)
        .resolve(42)
        .await
        .expect("resolve from index")
        .expect("about is published");
    let from_store = site
        .store_arbitrator(&config)
        .resolve(42)
        .await
        .expect("resolve from store")
        .expect("about exists");

    assert_eq!(from_index.provenance(), Provenance::SearchIndex);
    assert_eq!(from_store.provenance(), Provenance::Store);
    assert_eq!(*from_index, *from_store);
    assert_eq!(from_index.url_name(), "about-us");
    assert_eq!(from_index.path().to_string(), "-1,10,42");
    assert_eq!(
        from_index.property("title").and_then(|p| p.value()),
        Some("About")
    );
}

#[tokio::test]
async fn reserved_ids_never_touch_a_source() {
    let site = Site::new().await;
    let arbitrator = site.indexed_arbitrator(&CacheConfig::default());

    for id in [0, -1, -20] {
        assert!(arbitrator.resolve(id).await.expect("resolve").is_none());
    }
    assert_eq!(site.repo.store_reads(), 0);
    assert_eq!(site.index.search_count(), 0);
}

#[tokio::test]
async fn children_follow_sort_order() {
    let site = Site::new().await;
    let arbitrator = site.indexed_arbitrator(&CacheConfig::default());

    let home = arbitrator.resolve(10).await.expect("resolve").expect("home");
    let children = home.children().await.expect("children");
    let ids: Vec<i32> = children.iter().map(|child| child.id()).collect();
    // the draft is not in the index
    assert_eq!(ids, vec![42]);

    let parent = children[0].parent().await.expect("parent").expect("home");
    assert_eq!(parent.id(), 10);
}

#[tokio::test]
async fn disabled_memoization_runs_the_producer_every_time() {
    let config = CacheConfig {
        ttl_seconds: 0,
        ..CacheConfig::default()
    };
    let memo = Memoizer::from_config(&config);
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
        let produced = memo
            .get_or_compute(42, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::convert::Infallible>(Some(Arc::new(CacheValues::new(
                    Provenance::Store,
                ))))
            })
            .await
            .expect("infallible");
        assert!(produced.is_some());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(memo.is_empty());
}

#[tokio::test]
async fn memoized_nodes_are_reused_until_a_change_is_consumed() {
    let site = Site::new().await;
    let arbitrator = site.store_arbitrator(&CacheConfig::default());
    let consumer = site.consumer(&arbitrator);

    let before = arbitrator.resolve(42).await.expect("resolve").expect("about");
    assert_eq!(before.name(), "About Us");
    let reads = site.repo.store_reads();
    arbitrator.resolve(42).await.expect("resolve");
    assert_eq!(site.repo.store_reads(), reads);

    let mut edited = site.repo.entity(42).await.expect("about");
    edited.name = "About the Company".to_string();
    site.service.save(edited, 7).await.expect("save");

    let stale = arbitrator.resolve(42).await.expect("resolve").expect("about");
    assert_eq!(stale.name(), "About Us");

    assert_eq!(consumer.consume_all(), 1);
    let fresh = arbitrator.resolve(42).await.expect("resolve").expect("about");
    assert_eq!(fresh.name(), "About the Company");
}

#[tokio::test]
async fn recoverable_index_failures_fall_back_to_the_store() {
    let site = Site::new().await;
    let arbitrator = site.indexed_arbitrator(&CacheConfig::default());
    site.index.fail_with(Some(IndexFailure::Unavailable));

    let node = arbitrator.resolve(42).await.expect("resolve").expect("about");

    assert_eq!(node.provenance(), Provenance::Store);
    assert_eq!(arbitrator.index_miss_count(), 1);
}

#[tokio::test]
async fn query_failures_are_reported() {
    let site = Site::new().await;
    let arbitrator = site.indexed_arbitrator(&CacheConfig::default());
    site.index.fail_with(Some(IndexFailure::Query));

    assert!(arbitrator.resolve(42).await.is_err());
    assert_eq!(arbitrator.index_miss_count(), 0);
}

#[tokio::test]
async fn miss_counter_saturates_at_the_threshold() {
    let site = Site::new().await;
    let config = CacheConfig {
        ttl_seconds: 0,
        index_miss_warn_threshold: 2,
        ..CacheConfig::default()
    };
    let arbitrator: SourceArbitrator = site.indexed_arbitrator(&config);

    // drafts are only in the store
    for _ in 0..5 {
        arbitrator.resolve(44).await.expect("resolve").expect("draft");
    }

    assert_eq!(arbitrator.index_miss_count(), 2);
}

#[tokio::test]
async fn trashed_content_does_not_resolve() {
    let site = Site::new().await;
    let arbitrator = site.store_arbitrator(&CacheConfig::default());

    site.service
        .move_to_recycle_bin(42, 7)
        .await
        .expect("trash");

    assert!(arbitrator.resolve(42).await.expect("resolve").is_none());
    assert!(arbitrator.resolve(43).await.expect("resolve").is_none());
}
