use std::collections::HashSet;
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;

use homefeed::application::feed::{FeedService, FeedServiceConfig};
use homefeed::application::pagination::FeedWindow;
use homefeed::cache::MemoryFeedCache;
use homefeed::domain::entities::Post;
use homefeed::domain::types::{PostId, UserId};
use homefeed::infra::cache_warmer::{CacheWarmer, WarmerConfig};
use homefeed::infra::memory::{MemoryFriendGraph, MemoryPostStore};
use homefeed::infra::notifier::{BroadcastNotifier, NotifierConfig};
use homefeed::infra::telemetry::MetricsObserver;

#[tokio::test]
async fn feed_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let posts = Arc::new(MemoryPostStore::new());
    let graph = Arc::new(MemoryFriendGraph::new());
    let cache = Arc::new(MemoryFeedCache::new());
    let notifier = Arc::new(BroadcastNotifier::new(&NotifierConfig::default()));

    let service = FeedService::new(
        posts.clone(),
        graph.clone(),
        cache.clone(),
        notifier,
        FeedServiceConfig::default(),
    )
    .with_observer(Arc::new(MetricsObserver));

    let (a, b) = (UserId::new_v4(), UserId::new_v4());
    graph.add_friendship(a, b);

    // Write path: store + fanout.
    service
        .create_post(a, Post::new(PostId::new_v4(), a, "metrics"))
        .await
        .expect("post created");

    // Read path from both sources.
    service
        .get_feed(b, FeedWindow::new(10, 0))
        .await
        .expect("cached read");
    service
        .get_feed(b, FeedWindow::ALL)
        .await
        .expect("store read");

    // Warm path.
    CacheWarmer::new(
        graph.clone(),
        graph,
        posts,
        cache,
        WarmerConfig {
            capacity: 1000,
            concurrency: 1,
        },
    )
    .warm_all_users()
    .await
    .expect("warm run");

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "homefeed_posts_stored_total",
        "homefeed_fanout_delivered_total",
        "homefeed_fanout_ms",
        "homefeed_feed_reads_total",
        "homefeed_cache_warm_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let sources: HashSet<String> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| composite_key.key().name() == "homefeed_feed_reads_total")
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .map(|label| label.value().to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    assert!(sources.contains("cache"));
    assert!(sources.contains("store"));
}
