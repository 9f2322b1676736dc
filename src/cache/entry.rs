//! Serialized post snapshots as stored in a user feed.

use bytes::Bytes;

use crate::domain::entities::Post;

use super::CacheError;

/// A denormalized JSON copy of a [`Post`].
///
/// Entries are snapshots: they never observe later changes to the source post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry(Bytes);

impl FeedEntry {
    pub fn snapshot(post: &Post) -> Result<Self, CacheError> {
        serde_json::to_vec(post)
            .map(|raw| Self(Bytes::from(raw)))
            .map_err(CacheError::Codec)
    }

    pub fn from_bytes(raw: impl Into<Bytes>) -> Self {
        Self(raw.into())
    }

    pub fn decode(&self) -> Result<Post, CacheError> {
        serde_json::from_slice(&self.0).map_err(CacheError::Codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{PostId, UserId};

    #[test]
    fn snapshot_decodes_to_the_same_post() {
        let post = Post::new(PostId::new_v4(), UserId::new_v4(), "hello");
        let entry = FeedEntry::snapshot(&post).expect("snapshot");
        assert_eq!(entry.decode().expect("decode"), post);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let entry = FeedEntry::from_bytes(&b"{not json"[..]);
        assert!(matches!(entry.decode(), Err(CacheError::Codec(_))));
    }
}
