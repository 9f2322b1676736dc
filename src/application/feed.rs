//! Home feed orchestration.
//!
//! Writes fan a new post out to every friend of its author; reads serve the
//! author's friends' posts either from the bounded feed cache or from the
//! post store. Nothing here is transactional: a failed fanout leaves the post
//! stored and every friend reached before the failure updated.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::notifier::{FanoutNotifier, NotifyError};
use crate::application::observer::{FeedObserver, NoopObserver};
use crate::application::pagination::FeedWindow;
use crate::application::repos::{FriendGraph, PostStore, RepoError};
use crate::cache::{CacheError, DEFAULT_FEED_CAPACITY, FeedCache, FeedEntry};
use crate::domain::entities::Post;
use crate::domain::types::{PostId, UserId};

const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// How fanout reacts to a friend it cannot reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanoutPolicy {
    /// Stop at the first failing friend; later friends are skipped.
    #[default]
    FailFast,
    /// Try every friend and collect all failures.
    BestEffort,
}

impl FromStr for FanoutPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "fail_fast" => Ok(FanoutPolicy::FailFast),
            "best_effort" => Ok(FanoutPolicy::BestEffort),
            other => Err(format!(
                "expected `fail_fast` or `best_effort`, got `{other}`"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedServiceConfig {
    pub capacity: usize,
    pub policy: FanoutPolicy,
    pub io_timeout: Duration,
}

impl Default for FeedServiceConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_FEED_CAPACITY,
            policy: FanoutPolicy::default(),
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl From<&crate::config::FeedSettings> for FeedServiceConfig {
    fn from(settings: &crate::config::FeedSettings) -> Self {
        Self {
            capacity: settings.cache_capacity.get(),
            policy: settings.fanout_policy,
            io_timeout: settings.io_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutStep {
    CacheWrite,
    Notify,
}

impl FanoutStep {
    pub fn as_str(self) -> &'static str {
        match self {
            FanoutStep::CacheWrite => "cache_write",
            FanoutStep::Notify => "notify",
        }
    }
}

impl fmt::Display for FanoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum FanoutCause {
    #[error(transparent)]
    Cache(CacheError),
    #[error(transparent)]
    Notify(NotifyError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
#[error("friend {friend} failed at {step}: {cause}")]
pub struct FanoutFailure {
    pub friend: UserId,
    pub step: FanoutStep,
    #[source]
    pub cause: FanoutCause,
}

/// A fanout that did not reach every friend.
///
/// Friends in `delivered` keep their cache entry and notification. A friend
/// that failed at [`FanoutStep::Notify`] also keeps its cache entry.
#[derive(Debug)]
pub struct PartialFanout {
    pub post_id: PostId,
    pub delivered: Vec<UserId>,
    pub failures: Vec<FanoutFailure>,
    pub skipped: Vec<UserId>,
}

impl fmt::Display for PartialFanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fanout of post {} incomplete: {} delivered, {} failed, {} skipped",
            self.post_id,
            self.delivered.len(),
            self.failures.len(),
            self.skipped.len()
        )
    }
}

impl std::error::Error for PartialFanout {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|failure| failure as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug)]
pub enum FanoutOutcome {
    Success { delivered: Vec<UserId> },
    PartialFailure(PartialFanout),
}

impl FanoutOutcome {
    pub fn delivered(&self) -> &[UserId] {
        match self {
            FanoutOutcome::Success { delivered } => delivered,
            FanoutOutcome::PartialFailure(partial) => &partial.delivered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    Cache,
    Store,
}

impl FeedSource {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedSource::Cache => "cache",
            FeedSource::Store => "store",
        }
    }
}

/// Collaborator whose call ran past the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedDependency {
    PostStore,
    FriendGraph,
    FeedCache,
}

#[derive(Debug)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub source: FeedSource,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("post store unavailable")]
    StorageUnavailable(#[source] RepoError),
    #[error("post {0} already exists")]
    DuplicatePost(PostId),
    #[error("friend graph unavailable for user {user}")]
    FriendGraphUnavailable {
        user: UserId,
        #[source]
        source: RepoError,
    },
    #[error("post stored but not delivered to every friend")]
    PartialFanout(#[source] Box<PartialFanout>),
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        dependency: FeedDependency,
        operation: &'static str,
        timeout: Duration,
    },
    #[error("feed entry could not be encoded or decoded")]
    CorruptEntry(#[source] CacheError),
    #[error("invalid feed request: {0}")]
    Validation(String),
}

pub struct FeedService {
    posts: Arc<dyn PostStore>,
    friends: Arc<dyn FriendGraph>,
    cache: Arc<dyn FeedCache>,
    notifier: Arc<dyn FanoutNotifier>,
    observer: Arc<dyn FeedObserver>,
    config: FeedServiceConfig,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostStore>,
        friends: Arc<dyn FriendGraph>,
        cache: Arc<dyn FeedCache>,
        notifier: Arc<dyn FanoutNotifier>,
        config: FeedServiceConfig,
    ) -> Self {
        Self {
            posts,
            friends,
            cache,
            notifier,
            observer: Arc::new(NoopObserver),
            config,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FeedObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &FeedServiceConfig {
        &self.config
    }

    /// Store `post` and push it into every friend's feed.
    ///
    /// An error after the store step does not undo it: the post stays
    /// durable, and with [`FeedError::PartialFanout`] some friends already
    /// see it.
    pub async fn create_post(&self, author: UserId, post: Post) -> Result<PostId, FeedError> {
        if post.author != author {
            return Err(FeedError::Validation(format!(
                "post {} is authored by {}, not {author}",
                post.id, post.author
            )));
        }

        self.deadline(
            FeedDependency::PostStore,
            "post_store.append",
            self.posts.append(&post),
        )
            .await?
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => FeedError::DuplicatePost(post.id),
                other => FeedError::StorageUnavailable(other),
            })?;
        self.observer.post_stored(post.id);

        let friends = self.friends_of(author).await?;

        match self.fanout(&post, &friends).await? {
            FanoutOutcome::Success { delivered } => {
                debug!(
                    target = "application::feed::create_post",
                    post_id = %post.id,
                    delivered = delivered.len(),
                    "fanout complete"
                );
                Ok(post.id)
            }
            FanoutOutcome::PartialFailure(partial) => {
                warn!(
                    target = "application::feed::create_post",
                    post_id = %post.id,
                    delivered = partial.delivered.len(),
                    failed = partial.failures.len(),
                    skipped = partial.skipped.len(),
                    "fanout incomplete"
                );
                Err(FeedError::PartialFanout(Box::new(partial)))
            }
        }
    }

    /// Push `post` to each of `friends` in order: cache write, then notify.
    ///
    /// The author is never fanned out to, even if listed.
    pub async fn fanout(&self, post: &Post, friends: &[UserId]) -> Result<FanoutOutcome, FeedError> {
        let entry = FeedEntry::snapshot(post).map_err(FeedError::CorruptEntry)?;
        let started = Instant::now();

        let targets: Vec<UserId> = friends
            .iter()
            .copied()
            .filter(|friend| *friend != post.author)
            .collect();

        let mut delivered = Vec::with_capacity(targets.len());
        let mut failures = Vec::new();
        let mut skipped = Vec::new();

        for (index, friend) in targets.iter().copied().enumerate() {
            match self.deliver(friend, post, &entry).await {
                Ok(()) => {
                    self.observer.fanout_delivered(post.id, friend);
                    delivered.push(friend);
                }
                Err(failure) => {
                    self.observer.fanout_failed(post.id, friend, failure.step);
                    warn!(
                        target = "application::feed::fanout",
                        post_id = %post.id,
                        friend = %friend,
                        step = failure.step.as_str(),
                        error = %failure.cause,
                        "fanout to friend failed"
                    );
                    failures.push(failure);
                    if self.config.policy == FanoutPolicy::FailFast {
                        skipped.extend_from_slice(&targets[index + 1..]);
                        break;
                    }
                }
            }
        }

        self.observer
            .fanout_finished(post.id, delivered.len(), skipped.len(), started.elapsed());

        if failures.is_empty() {
            Ok(FanoutOutcome::Success { delivered })
        } else {
            Ok(FanoutOutcome::PartialFailure(PartialFanout {
                post_id: post.id,
                delivered,
                failures,
                skipped,
            }))
        }
    }

    pub async fn get_feed(&self, user: UserId, window: FeedWindow) -> Result<Vec<Post>, FeedError> {
        self.feed_page(user, window).await.map(|page| page.posts)
    }

    /// Read a window of `user`'s feed and report where it came from.
    ///
    /// The cache answers only when the feed is populated and the window lies
    /// strictly inside its capacity. Reads never populate the cache.
    pub async fn feed_page(&self, user: UserId, window: FeedWindow) -> Result<FeedPage, FeedError> {
        if window.fits_cache(self.config.capacity) {
            match self.read_cached(user, window).await {
                Ok(Some(posts)) => {
                    self.observer
                        .feed_served(user, FeedSource::Cache, posts.len());
                    return Ok(FeedPage {
                        posts,
                        source: FeedSource::Cache,
                    });
                }
                Ok(None) => {}
                Err(CachedReadError::Corrupt(err)) => return Err(FeedError::CorruptEntry(err)),
                Err(CachedReadError::Unavailable(reason)) => {
                    warn!(
                        target = "application::feed::feed_page",
                        user = %user,
                        reason = %reason,
                        "feed cache unavailable, reading from post store"
                    );
                    self.observer.cache_degraded(user);
                }
            }
        }

        let friends = self.friends_of(user).await?;
        let posts = self
            .deadline(
                FeedDependency::PostStore,
                "post_store.query_by_friends",
                self.posts.query_by_friends(user, &friends, window),
            )
            .await?
            .map_err(FeedError::StorageUnavailable)?;

        self.observer
            .feed_served(user, FeedSource::Store, posts.len());
        Ok(FeedPage {
            posts,
            source: FeedSource::Store,
        })
    }

    async fn read_cached(
        &self,
        user: UserId,
        window: FeedWindow,
    ) -> Result<Option<Vec<Post>>, CachedReadError> {
        let exists = self
            .deadline(
                FeedDependency::FeedCache,
                "feed_cache.exists",
                self.cache.exists(user),
            )
            .await
            .map_err(CachedReadError::unavailable)?
            .map_err(CachedReadError::unavailable)?;
        if !exists {
            return Ok(None);
        }

        let entries = self
            .deadline(
                FeedDependency::FeedCache,
                "feed_cache.read",
                self.cache.read(user, window.start(), window.limit),
            )
            .await
            .map_err(CachedReadError::unavailable)?
            .map_err(CachedReadError::unavailable)?;

        entries
            .iter()
            .map(FeedEntry::decode)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(CachedReadError::Corrupt)
    }

    async fn deliver(
        &self,
        friend: UserId,
        post: &Post,
        entry: &FeedEntry,
    ) -> Result<(), FanoutFailure> {
        let timeout = self.config.io_timeout;
        let fail = |step, cause| FanoutFailure {
            friend,
            step,
            cause,
        };

        match tokio::time::timeout(
            timeout,
            self.cache
                .push_bounded(friend, entry.clone(), self.config.capacity),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(fail(FanoutStep::CacheWrite, FanoutCause::Cache(err))),
            Err(_) => return Err(fail(FanoutStep::CacheWrite, FanoutCause::Timeout(timeout))),
        }

        match tokio::time::timeout(timeout, self.notifier.publish(friend, post)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(fail(FanoutStep::Notify, FanoutCause::Notify(err))),
            Err(_) => Err(fail(FanoutStep::Notify, FanoutCause::Timeout(timeout))),
        }
    }

    async fn friends_of(&self, user: UserId) -> Result<Vec<UserId>, FeedError> {
        self.deadline(
            FeedDependency::FriendGraph,
            "friend_graph.friends_of",
            self.friends.friends_of(user),
        )
            .await?
            .map_err(|source| FeedError::FriendGraphUnavailable { user, source })
    }

    async fn deadline<F, T>(
        &self,
        dependency: FeedDependency,
        operation: &'static str,
        future: F,
    ) -> Result<T, FeedError>
    where
        F: Future<Output = T>,
    {
        let timeout = self.config.io_timeout;
        tokio::time::timeout(timeout, future)
            .await
            .map_err(|_| FeedError::Timeout {
                dependency,
                operation,
                timeout,
            })
    }
}

enum CachedReadError {
    Unavailable(String),
    Corrupt(CacheError),
}

impl CachedReadError {
    fn unavailable(err: impl fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}
