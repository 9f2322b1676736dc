mod feed;
mod middleware;

pub use feed::{CreatePostRequest, CreatePostResponse, FEED_SOURCE_HEADER, VIEWER_HEADER, Viewer};
pub use middleware::RequestContext;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::application::feed::FeedService;
use crate::infra::{
    cache_warmer::CacheWarmer, db::PostgresRepositories, notifier::BroadcastNotifier,
};

use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub notifier: Arc<BroadcastNotifier>,
    pub warmer: Arc<CacheWarmer>,
    /// `None` when running on the in-memory stores.
    pub db: Option<Arc<PostgresRepositories>>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/post/feed", get(feed::get_feed))
        .route("/post/create", post(feed::create_post))
        .route("/post/feed/posted", get(feed::posted_stream))
        .route("/_admin/feed-cache/warm", post(feed::warm_cache))
        .route("/_health/db", get(db_health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn db_health(State(state): State<HttpState>) -> Response {
    match state.db.as_ref() {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
