//! Per-user feed storage.
//!
//! [`FeedCache`] is the capability the feed service talks to; [`MemoryFeedCache`]
//! is the in-process backend. Every user feed is a bounded list ordered by
//! insertion, newest at index 0.

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::application::pagination::Limit;
use crate::domain::types::UserId;

use super::entry::FeedEntry;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("feed cache unavailable: {0}")]
    Unavailable(String),
    #[error("feed entry codec failed: {0}")]
    Codec(#[source] serde_json::Error),
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

#[async_trait]
pub trait FeedCache: Send + Sync {
    /// True once a feed has been materialized for `user`.
    async fn exists(&self, user: UserId) -> Result<bool, CacheError>;

    /// Insert `entry` at the head, creating the feed when absent.
    async fn prepend(&self, user: UserId, entry: FeedEntry) -> Result<(), CacheError>;

    /// Keep only the first `cap` entries.
    async fn trim(&self, user: UserId, cap: usize) -> Result<(), CacheError>;

    /// Prepend then trim as one step.
    ///
    /// Backends that can do this atomically must override it; concurrent
    /// pushes to the same user may otherwise interleave between the two calls.
    async fn push_bounded(
        &self,
        user: UserId,
        entry: FeedEntry,
        cap: usize,
    ) -> Result<(), CacheError> {
        self.prepend(user, entry).await?;
        self.trim(user, cap).await
    }

    /// Entries in `[offset, offset + limit)`, or from `offset` to the end when
    /// unbounded. Reading past the end yields fewer entries.
    async fn read(
        &self,
        user: UserId,
        offset: usize,
        limit: Limit,
    ) -> Result<Vec<FeedEntry>, CacheError>;

    /// Replace the feed with the first `cap` of `entries`.
    async fn warm_rebuild(
        &self,
        user: UserId,
        entries: Vec<FeedEntry>,
        cap: usize,
    ) -> Result<(), CacheError>;
}

/// In-process feed cache.
///
/// Each feed lives behind its own shard lock, so operations on one user are
/// serialized while different users proceed independently.
#[derive(Default)]
pub struct MemoryFeedCache {
    feeds: DashMap<UserId, VecDeque<FeedEntry>>,
}

impl MemoryFeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of materialized feeds.
    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Current length of one user's feed, zero when absent.
    pub fn feed_len(&self, user: UserId) -> usize {
        self.feeds.get(&user).map(|feed| feed.len()).unwrap_or(0)
    }
}

#[async_trait]
impl FeedCache for MemoryFeedCache {
    async fn exists(&self, user: UserId) -> Result<bool, CacheError> {
        Ok(self.feeds.contains_key(&user))
    }

    async fn prepend(&self, user: UserId, entry: FeedEntry) -> Result<(), CacheError> {
        self.feeds.entry(user).or_default().push_front(entry);
        Ok(())
    }

    async fn trim(&self, user: UserId, cap: usize) -> Result<(), CacheError> {
        if let Some(mut feed) = self.feeds.get_mut(&user) {
            feed.truncate(cap);
        }
        Ok(())
    }

    async fn push_bounded(
        &self,
        user: UserId,
        entry: FeedEntry,
        cap: usize,
    ) -> Result<(), CacheError> {
        let mut feed = self.feeds.entry(user).or_default();
        feed.push_front(entry);
        feed.truncate(cap);
        Ok(())
    }

    async fn read(
        &self,
        user: UserId,
        offset: usize,
        limit: Limit,
    ) -> Result<Vec<FeedEntry>, CacheError> {
        let Some(feed) = self.feeds.get(&user) else {
            return Ok(Vec::new());
        };

        let take = match limit {
            Limit::Bounded(limit) => limit as usize,
            Limit::Unbounded => usize::MAX,
        };

        Ok(feed.iter().skip(offset).take(take).cloned().collect())
    }

    async fn warm_rebuild(
        &self,
        user: UserId,
        entries: Vec<FeedEntry>,
        cap: usize,
    ) -> Result<(), CacheError> {
        let rebuilt: VecDeque<FeedEntry> = entries.into_iter().take(cap).collect();
        self.feeds.insert(user, rebuilt);
        Ok(())
    }
}
