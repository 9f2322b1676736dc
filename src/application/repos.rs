//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::FeedWindow;
use crate::domain::entities::Post;
use crate::domain::types::UserId;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity violation: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Authoritative, append-only post storage.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert a post under its caller-supplied id.
    ///
    /// Fails with [`RepoError::Duplicate`] when the id is already taken.
    async fn append(&self, post: &Post) -> Result<(), RepoError>;

    /// Posts authored by any of `friends`, newest first.
    ///
    /// `user` is the reader the query is made for; adapters only use it for
    /// diagnostics.
    async fn query_by_friends(
        &self,
        user: UserId,
        friends: &[UserId],
        window: FeedWindow,
    ) -> Result<Vec<Post>, RepoError>;
}

/// Read-only view of the friendship graph.
#[async_trait]
pub trait FriendGraph: Send + Sync {
    /// Complete, de-duplicated friend list of `user`.
    async fn friends_of(&self, user: UserId) -> Result<Vec<UserId>, RepoError>;
}

/// Enumerates every known user.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_user_ids(&self) -> Result<Vec<UserId>, RepoError>;
}
