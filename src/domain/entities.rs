//! Domain entities.

use serde::{Deserialize, Serialize};

use super::types::{PostId, UserId};

/// An immutable post. Created once, never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(rename = "user_id")]
    pub author: UserId,
    pub text: String,
}

impl Post {
    pub fn new(id: PostId, author: UserId, text: impl Into<String>) -> Self {
        Self {
            id,
            author,
            text: text.into(),
        }
    }
}
