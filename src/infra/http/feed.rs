use std::convert::Infallible;

use async_stream::stream;
use axum::{
    Json,
    extract::{FromRequestParts, Query, State},
    http::{HeaderValue, StatusCode, request::Parts},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::{
    application::{error::HttpError, pagination::FeedWindow},
    domain::{
        entities::Post,
        types::{PostId, UserId},
    },
};

use super::HttpState;

/// Header an upstream gateway sets to the authenticated user's id.
pub const VIEWER_HEADER: &str = "x-user-id";
/// Response header naming which side served a feed read.
pub const FEED_SOURCE_HEADER: &str = "x-feed-source";

/// The user a request acts for.
#[derive(Debug, Clone, Copy)]
pub struct Viewer(pub UserId);

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts.headers.get(VIEWER_HEADER).ok_or_else(|| {
            HttpError::new(
                "infra::http::viewer",
                StatusCode::UNAUTHORIZED,
                "Missing user identity",
                format!("request has no `{VIEWER_HEADER}` header"),
            )
        })?;

        let value = raw.to_str().map_err(|err| {
            HttpError::from_error(
                "infra::http::viewer",
                StatusCode::BAD_REQUEST,
                "Invalid user identity",
                &err,
            )
        })?;

        value.parse::<UserId>().map(Viewer).map_err(|err| {
            HttpError::from_error(
                "infra::http::viewer",
                StatusCode::BAD_REQUEST,
                "Invalid user identity",
                &err,
            )
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct FeedQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

pub(super) async fn get_feed(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Query(query): Query<FeedQuery>,
) -> Result<Response, HttpError> {
    let window = FeedWindow::from_raw(query.limit, query.offset).map_err(|err| {
        HttpError::from_error(
            "infra::http::get_feed",
            StatusCode::BAD_REQUEST,
            "Invalid pagination",
            &err,
        )
    })?;

    let page = state.feed.feed_page(viewer, window).await?;

    let mut response = Json(page.posts).into_response();
    response.headers_mut().insert(
        FEED_SOURCE_HEADER,
        HeaderValue::from_static(page.source.as_str()),
    );
    Ok(response)
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatePostRequest {
    pub text: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatePostResponse {
    pub post_id: PostId,
}

pub(super) async fn create_post(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Json(request): Json<CreatePostRequest>,
) -> Result<Json<CreatePostResponse>, HttpError> {
    if request.text.trim().is_empty() {
        return Err(HttpError::new(
            "infra::http::create_post",
            StatusCode::BAD_REQUEST,
            "Post text must not be empty",
            "empty post text",
        ));
    }

    let post = Post::new(PostId::new_v4(), viewer, request.text);
    let post_id = state.feed.create_post(viewer, post).await?;

    Ok(Json(CreatePostResponse { post_id }))
}

/// Live stream of posts fanned out to the viewer, one `post` event each.
pub(super) async fn posted_stream(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
) -> Response {
    let mut receiver = state.notifier.subscribe(viewer);
    debug!(target = "homefeed::http::posted", user = %viewer, "viewer connected");

    let events = stream! {
        loop {
            match receiver.recv().await {
                Ok(payload) => {
                    let data = String::from_utf8_lossy(&payload).into_owned();
                    yield Ok::<Event, Infallible>(Event::default().event("post").data(data));
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(
                        target = "homefeed::http::posted",
                        user = %viewer,
                        missed,
                        "live viewer lagged, notifications dropped"
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

pub(super) async fn warm_cache(State(state): State<HttpState>) -> Response {
    match state.warmer.warm_all_users().await {
        Ok(report) => Json(report).into_response(),
        Err(err) => HttpError::from_error(
            "infra::http::warm_cache",
            StatusCode::SERVICE_UNAVAILABLE,
            "Cache warm could not start",
            &err,
        )
        .into_response(),
    }
}
