//! Live post notifications.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::Post;
use crate::domain::types::UserId;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("failed to encode notification: {0}")]
    Codec(#[source] serde_json::Error),
}

impl NotifyError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Fire-and-forget publisher keyed by recipient.
///
/// A publish with no current subscriber for `user` is dropped and still
/// succeeds. Publishing the same post twice delivers it twice.
#[async_trait]
pub trait FanoutNotifier: Send + Sync {
    async fn publish(&self, user: UserId, post: &Post) -> Result<(), NotifyError>;
}
