use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use homefeed::application::feed::{FeedService, FeedServiceConfig};
use homefeed::cache::MemoryFeedCache;
use homefeed::domain::entities::Post;
use homefeed::domain::types::UserId;
use homefeed::infra::cache_warmer::{CacheWarmer, WarmerConfig};
use homefeed::infra::http::{
    CreatePostResponse, FEED_SOURCE_HEADER, HttpState, VIEWER_HEADER, build_router,
};
use homefeed::infra::memory::{MemoryFriendGraph, MemoryPostStore};
use homefeed::infra::notifier::{BroadcastNotifier, NotifierConfig};

struct TestApp {
    router: Router,
    graph: Arc<MemoryFriendGraph>,
}

fn test_app() -> TestApp {
    let posts = Arc::new(MemoryPostStore::new());
    let graph = Arc::new(MemoryFriendGraph::new());
    let cache = Arc::new(MemoryFeedCache::new());
    let notifier = Arc::new(BroadcastNotifier::new(&NotifierConfig::default()));

    let feed = Arc::new(FeedService::new(
        posts.clone(),
        graph.clone(),
        cache.clone(),
        notifier.clone(),
        FeedServiceConfig::default(),
    ));
    let warmer = Arc::new(CacheWarmer::new(
        graph.clone(),
        graph.clone(),
        posts,
        cache,
        WarmerConfig {
            capacity: 1000,
            concurrency: 2,
        },
    ));

    let router = build_router(HttpState {
        feed,
        notifier,
        warmer,
        db: None,
    });

    TestApp { router, graph }
}

fn create_request(author: UserId, text: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/post/create")
        .header(VIEWER_HEADER, author.to_string())
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": text }).to_string()))
        .expect("request should build")
}

fn feed_request(viewer: UserId, query: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(format!("/post/feed{query}"))
        .header(VIEWER_HEADER, viewer.to_string())
        .body(Body::empty())
        .expect("request should build")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be json")
}

#[tokio::test]
async fn created_post_shows_up_in_friend_feeds_only() {
    let app = test_app();
    let (a, b, c) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());
    app.graph.add_friendship(a, b);
    app.graph.add_friendship(a, c);

    let response = app
        .router
        .clone()
        .oneshot(create_request(a, "hello"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    let created: CreatePostResponse =
        serde_json::from_value(body_json(response).await).expect("create response");

    for friend in [b, c] {
        let response = app
            .router
            .clone()
            .oneshot(feed_request(friend, "?limit=-1&offset=-1"))
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[FEED_SOURCE_HEADER], "store");

        let feed = body_json(response).await;
        let head: Post = serde_json::from_value(feed[0].clone()).expect("post json");
        assert_eq!(head.id, created.post_id);
        assert_eq!(head.text, "hello");
        assert_eq!(feed[0]["user_id"], a.to_string());
    }

    let own = body_json(
        app.router
            .clone()
            .oneshot(feed_request(a, ""))
            .await
            .expect("router should respond"),
    )
    .await;
    assert_eq!(own, json!([]));
}

#[tokio::test]
async fn bounded_window_is_served_from_the_cache() {
    let app = test_app();
    let (a, b) = (UserId::new_v4(), UserId::new_v4());
    app.graph.add_friendship(a, b);

    for text in ["first", "second", "third"] {
        let response = app
            .router
            .clone()
            .oneshot(create_request(a, text))
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .router
        .clone()
        .oneshot(feed_request(b, "?limit=2&offset=1"))
        .await
        .expect("router should respond");
    assert_eq!(response.headers()[FEED_SOURCE_HEADER], "cache");

    let feed = body_json(response).await;
    let texts: Vec<&str> = feed
        .as_array()
        .expect("array")
        .iter()
        .map(|post| post["text"].as_str().expect("text"))
        .collect();
    assert_eq!(texts, vec!["second", "first"]);
}

#[tokio::test]
async fn requests_without_identity_are_rejected() {
    let app = test_app();
    let request = Request::builder()
        .uri("/post/feed")
        .body(Body::empty())
        .expect("request should build");

    let response = app.router.oneshot(request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_identity_and_pagination_are_bad_requests() {
    let app = test_app();

    let request = Request::builder()
        .uri("/post/feed")
        .header(VIEWER_HEADER, "not-a-uuid")
        .body(Body::empty())
        .expect("request should build");
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .router
        .clone()
        .oneshot(feed_request(UserId::new_v4(), "?limit=-7"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_post_text_is_rejected() {
    let app = test_app();
    let response = app
        .router
        .oneshot(create_request(UserId::new_v4(), "   "))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_warm_rebuilds_every_known_user() {
    let app = test_app();
    let (a, b, c) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());
    app.graph.add_friendship(a, b);
    app.graph.add_user(c);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/_admin/feed-cache/warm")
        .body(Body::empty())
        .expect("request should build");
    let response = app.router.oneshot(request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);

    let report = body_json(response).await;
    assert_eq!(report["warmed"], 3);
    assert_eq!(report["failures"], json!([]));
}

#[tokio::test]
async fn database_health_without_database_is_ok() {
    let app = test_app();
    let request = Request::builder()
        .uri("/_health/db")
        .body(Body::empty())
        .expect("request should build");

    let response = app.router.oneshot(request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn live_stream_receives_posts_from_friends() {
    let app = test_app();
    let (a, b) = (UserId::new_v4(), UserId::new_v4());
    app.graph.add_friendship(a, b);

    let request = Request::builder()
        .uri("/post/feed/posted")
        .header(VIEWER_HEADER, b.to_string())
        .body(Body::empty())
        .expect("request should build");
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    let created = app
        .router
        .clone()
        .oneshot(create_request(a, "live hello"))
        .await
        .expect("router should respond");
    assert_eq!(created.status(), StatusCode::OK);

    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("event should arrive")
        .expect("stream should stay open")
        .expect("frame should be readable");
    let chunk = frame.into_data().expect("data frame");
    let text = String::from_utf8(chunk.to_vec()).expect("utf-8 event");

    assert!(text.starts_with("event: post\n"));
    assert!(text.contains("live hello"));
}
