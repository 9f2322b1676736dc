//! Hooks the feed service reports through.

use std::time::Duration;

use crate::domain::types::{PostId, UserId};

use super::feed::{FanoutStep, FeedSource};

/// Receives feed service events. Every method defaults to a no-op.
pub trait FeedObserver: Send + Sync {
    fn post_stored(&self, _post: PostId) {}

    fn fanout_delivered(&self, _post: PostId, _friend: UserId) {}

    fn fanout_failed(&self, _post: PostId, _friend: UserId, _step: FanoutStep) {}

    /// Called once per fanout with the number of friends reached and skipped.
    fn fanout_finished(
        &self,
        _post: PostId,
        _delivered: usize,
        _skipped: usize,
        _elapsed: Duration,
    ) {
    }

    fn feed_served(&self, _user: UserId, _source: FeedSource, _entries: usize) {}

    /// The cache failed on a read and the store answered instead.
    fn cache_degraded(&self, _user: UserId) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl FeedObserver for NoopObserver {}
