use std::{sync::Arc, time::Duration, time::Instant};

use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    application::{
        pagination::FeedWindow,
        repos::{FriendGraph, PostStore, RepoError, UserDirectory},
    },
    cache::{CacheError, FeedCache, FeedEntry},
    domain::types::UserId,
};

#[derive(Debug, Error)]
pub enum CacheWarmError {
    #[error("failed to list users: {0}")]
    Directory(#[source] RepoError),
    #[error("failed to load friends: {0}")]
    Friends(#[source] RepoError),
    #[error("failed to load posts: {0}")]
    Posts(#[source] RepoError),
    #[error("failed to rebuild cached feed: {0}")]
    Cache(#[source] CacheError),
}

#[derive(Debug, Clone, Serialize)]
pub struct WarmFailure {
    pub user: UserId,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmReport {
    pub warmed: usize,
    pub failures: Vec<WarmFailure>,
}

impl WarmReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct WarmerConfig {
    pub capacity: usize,
    pub concurrency: usize,
}

/// Rebuilds every user's cached feed from the post store.
pub struct CacheWarmer {
    users: Arc<dyn UserDirectory>,
    friends: Arc<dyn FriendGraph>,
    posts: Arc<dyn PostStore>,
    cache: Arc<dyn FeedCache>,
    config: WarmerConfig,
}

impl CacheWarmer {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        friends: Arc<dyn FriendGraph>,
        posts: Arc<dyn PostStore>,
        cache: Arc<dyn FeedCache>,
        config: WarmerConfig,
    ) -> Self {
        Self {
            users,
            friends,
            posts,
            cache,
            config,
        }
    }

    /// Rebuild the feed of every known user.
    ///
    /// A user that fails is recorded in the report and does not stop the run.
    /// Only failing to enumerate users aborts.
    pub async fn warm_all_users(&self) -> Result<WarmReport, CacheWarmError> {
        info!(target = "homefeed::cache_warmer", "warming feed cache");
        let started = Instant::now();

        let users = self
            .users
            .list_user_ids()
            .await
            .map_err(CacheWarmError::Directory)?;

        let results: Vec<(UserId, Result<(), CacheWarmError>)> = stream::iter(users)
            .map(|user| async move { (user, self.warm_user(user).await) })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = WarmReport::default();
        for (user, result) in results {
            match result {
                Ok(()) => report.warmed += 1,
                Err(err) => {
                    warn!(
                        target = "homefeed::cache_warmer",
                        user = %user,
                        error = %err,
                        "failed to warm user feed"
                    );
                    counter!("homefeed_cache_warm_failed_total").increment(1);
                    report.failures.push(WarmFailure {
                        user,
                        error: err.to_string(),
                    });
                }
            }
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!("homefeed_cache_warm_ms").record(elapsed_ms);
        info!(
            target = "homefeed::cache_warmer",
            warmed = report.warmed,
            failed = report.failures.len(),
            elapsed_ms,
            "feed cache warm finished"
        );

        Ok(report)
    }

    pub async fn warm_user(&self, user: UserId) -> Result<(), CacheWarmError> {
        let capacity = self.config.capacity;
        let friends = self
            .friends
            .friends_of(user)
            .await
            .map_err(CacheWarmError::Friends)?;

        let window = FeedWindow::new(u32::try_from(capacity).unwrap_or(u32::MAX), 0);
        let posts = self
            .posts
            .query_by_friends(user, &friends, window)
            .await
            .map_err(CacheWarmError::Posts)?;

        let entries = posts
            .iter()
            .map(FeedEntry::snapshot)
            .collect::<Result<Vec<_>, _>>()
            .map_err(CacheWarmError::Cache)?;

        self.cache
            .warm_rebuild(user, entries, capacity)
            .await
            .map_err(CacheWarmError::Cache)
    }

    /// Run [`CacheWarmer::warm_all_users`] every `interval`, starting after one
    /// interval has elapsed.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = self.warm_all_users().await {
                    warn!(
                        target = "homefeed::cache_warmer",
                        error = %err,
                        "periodic feed cache warm failed"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::application::pagination::Limit;
    use crate::cache::MemoryFeedCache;
    use crate::domain::entities::Post;
    use crate::domain::types::PostId;
    use crate::infra::memory::{MemoryFriendGraph, MemoryPostStore};

    /// Friend graph that fails for one user and defers to a real graph otherwise.
    struct PickyGraph {
        inner: Arc<MemoryFriendGraph>,
        broken: UserId,
    }

    #[async_trait]
    impl FriendGraph for PickyGraph {
        async fn friends_of(&self, user: UserId) -> Result<Vec<UserId>, RepoError> {
            if user == self.broken {
                return Err(RepoError::Persistence("graph shard offline".into()));
            }
            self.inner.friends_of(user).await
        }
    }

    fn warmer(
        graph: Arc<MemoryFriendGraph>,
        friends: Arc<dyn FriendGraph>,
        posts: Arc<MemoryPostStore>,
        cache: Arc<MemoryFeedCache>,
        capacity: usize,
    ) -> CacheWarmer {
        CacheWarmer::new(
            graph,
            friends,
            posts,
            cache,
            WarmerConfig {
                capacity,
                concurrency: 4,
            },
        )
    }

    async fn cached_texts(cache: &MemoryFeedCache, user: UserId) -> Vec<String> {
        cache
            .read(user, 0, Limit::Unbounded)
            .await
            .unwrap()
            .iter()
            .map(|entry| entry.decode().unwrap().text)
            .collect()
    }

    #[tokio::test]
    async fn rebuilds_each_feed_newest_first_up_to_capacity() {
        let graph = Arc::new(MemoryFriendGraph::new());
        let posts = Arc::new(MemoryPostStore::new());
        let cache = Arc::new(MemoryFeedCache::new());
        let (a, b) = (UserId::new_v4(), UserId::new_v4());
        graph.add_friendship(a, b);
        for text in ["one", "two", "three"] {
            posts
                .append(&Post::new(PostId::new_v4(), b, text))
                .await
                .unwrap();
        }

        let report = warmer(graph.clone(), graph.clone(), posts, cache.clone(), 2)
            .warm_all_users()
            .await
            .unwrap();

        assert_eq!(report.warmed, 2);
        assert!(report.is_clean());
        assert_eq!(cached_texts(&cache, a).await, vec!["three", "two"]);
        assert!(cache.exists(b).await.unwrap());
        assert!(cached_texts(&cache, b).await.is_empty());
    }

    #[tokio::test]
    async fn one_failing_user_does_not_stop_the_others() {
        let graph = Arc::new(MemoryFriendGraph::new());
        let posts = Arc::new(MemoryPostStore::new());
        let cache = Arc::new(MemoryFeedCache::new());
        let (a, b, c) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());
        graph.add_friendship(a, b);
        graph.add_friendship(b, c);
        posts
            .append(&Post::new(PostId::new_v4(), b, "from b"))
            .await
            .unwrap();

        let picky = Arc::new(PickyGraph {
            inner: graph.clone(),
            broken: a,
        });
        let report = warmer(graph, picky, posts, cache.clone(), 1000)
            .warm_all_users()
            .await
            .unwrap();

        assert_eq!(report.warmed, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].user, a);
        assert!(!cache.exists(a).await.unwrap());
        assert_eq!(cached_texts(&cache, c).await, vec!["from b"]);
    }
}
