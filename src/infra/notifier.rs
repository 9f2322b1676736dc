//! In-process per-user notification topics.
//!
//! Each user with at least one live viewer owns a broadcast channel; every
//! viewer connection holds a receiver on it. Messages are the post's JSON
//! wire form. Nothing is buffered for users without a viewer.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use crate::application::notifier::{FanoutNotifier, NotifyError};
use crate::domain::entities::Post;
use crate::domain::types::UserId;

pub type PostStream = broadcast::Receiver<Bytes>;

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Messages a slow viewer may fall behind before it starts losing them.
    pub channel_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

impl From<&crate::config::NotifierSettings> for NotifierConfig {
    fn from(settings: &crate::config::NotifierSettings) -> Self {
        Self {
            channel_capacity: settings.channel_capacity.get(),
        }
    }
}

pub struct BroadcastNotifier {
    topics: DashMap<UserId, broadcast::Sender<Bytes>>,
    capacity: usize,
    closed: AtomicBool,
}

impl BroadcastNotifier {
    pub fn new(config: &NotifierConfig) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: config.channel_capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Attach a new viewer to `user`'s topic.
    ///
    /// After [`BroadcastNotifier::close`] the returned stream is already
    /// closed.
    pub fn subscribe(&self, user: UserId) -> PostStream {
        if self.is_closed() {
            return broadcast::channel(1).1;
        }
        self.topics
            .entry(user)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of users with a live topic.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Stop accepting publishes and disconnect every viewer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.topics.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FanoutNotifier for BroadcastNotifier {
    async fn publish(&self, user: UserId, post: &Post) -> Result<(), NotifyError> {
        if self.is_closed() {
            return Err(NotifyError::transport("notifier is closed"));
        }

        let payload = serde_json::to_vec(post)
            .map(Bytes::from)
            .map_err(NotifyError::Codec)?;

        let Some(sender) = self.topics.get(&user).map(|topic| topic.clone()) else {
            trace!(user = %user, post_id = %post.id, "no live viewer, notification dropped");
            return Ok(());
        };

        if sender.send(payload).is_err() {
            // Every viewer went away since the topic was created.
            self.topics
                .remove_if(&user, |_, sender| sender.receiver_count() == 0);
            trace!(user = %user, post_id = %post.id, "topic pruned, notification dropped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PostId;

    fn notifier() -> BroadcastNotifier {
        BroadcastNotifier::new(&NotifierConfig::default())
    }

    #[tokio::test]
    async fn subscriber_receives_json_post() {
        let notifier = notifier();
        let user = UserId::new_v4();
        let mut stream = notifier.subscribe(user);
        let post = Post::new(PostId::new_v4(), UserId::new_v4(), "live");

        notifier.publish(user, &post).await.unwrap();

        let raw = stream.recv().await.unwrap();
        let received: Post = serde_json::from_slice(&raw).unwrap();
        assert_eq!(received, post);
    }

    #[tokio::test]
    async fn publish_without_viewers_is_dropped_silently() {
        let notifier = notifier();
        let post = Post::new(PostId::new_v4(), UserId::new_v4(), "nobody home");

        notifier.publish(UserId::new_v4(), &post).await.unwrap();
        assert_eq!(notifier.topic_count(), 0);
    }

    #[tokio::test]
    async fn topics_are_pruned_once_viewers_leave() {
        let notifier = notifier();
        let user = UserId::new_v4();
        drop(notifier.subscribe(user));
        assert_eq!(notifier.topic_count(), 1);

        let post = Post::new(PostId::new_v4(), UserId::new_v4(), "gone");
        notifier.publish(user, &post).await.unwrap();
        assert_eq!(notifier.topic_count(), 0);
    }

    #[tokio::test]
    async fn same_post_can_be_published_twice() {
        let notifier = notifier();
        let user = UserId::new_v4();
        let mut stream = notifier.subscribe(user);
        let post = Post::new(PostId::new_v4(), UserId::new_v4(), "again");

        notifier.publish(user, &post).await.unwrap();
        notifier.publish(user, &post).await.unwrap();

        assert_eq!(stream.recv().await.unwrap(), stream.recv().await.unwrap());
    }

    #[tokio::test]
    async fn messages_keep_per_user_order() {
        let notifier = notifier();
        let user = UserId::new_v4();
        let mut stream = notifier.subscribe(user);
        let author = UserId::new_v4();

        for text in ["first", "second", "third"] {
            notifier
                .publish(user, &Post::new(PostId::new_v4(), author, text))
                .await
                .unwrap();
        }

        for expected in ["first", "second", "third"] {
            let raw = stream.recv().await.unwrap();
            let post: Post = serde_json::from_slice(&raw).unwrap();
            assert_eq!(post.text, expected);
        }
    }

    #[tokio::test]
    async fn closed_notifier_reports_transport_error() {
        let notifier = notifier();
        notifier.close();

        let post = Post::new(PostId::new_v4(), UserId::new_v4(), "late");
        let err = notifier.publish(UserId::new_v4(), &post).await.unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)));
    }

    #[tokio::test]
    async fn subscribing_after_close_yields_a_finished_stream() {
        let notifier = notifier();
        notifier.close();

        let mut stream = notifier.subscribe(UserId::new_v4());
        assert!(matches!(
            stream.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_eq!(notifier.topic_count(), 0);
    }
}
