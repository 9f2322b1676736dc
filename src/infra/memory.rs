//! In-process persistence adapters.
//!
//! Used when no database is configured and throughout the test suite. They
//! implement the same traits as the Postgres adapters, including the
//! newest-first ordering of feed queries.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::application::pagination::{FeedWindow, Limit};
use crate::application::repos::{FriendGraph, PostStore, RepoError, UserDirectory};
use crate::domain::entities::Post;
use crate::domain::types::{PostId, UserId};
use crate::util::lock::{rw_read, rw_write};

const LOCK_TARGET: &str = "infra::memory";

#[derive(Default)]
struct PostLog {
    /// Oldest first; the index doubles as the insertion sequence.
    posts: Vec<Post>,
    ids: HashSet<PostId>,
}

#[derive(Default)]
pub struct MemoryPostStore {
    log: RwLock<PostLog>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.log, LOCK_TARGET, "post_store.len").posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn append(&self, post: &Post) -> Result<(), RepoError> {
        let mut log = rw_write(&self.log, LOCK_TARGET, "post_store.append");
        if !log.ids.insert(post.id) {
            return Err(RepoError::Duplicate {
                constraint: "posts_pkey".to_string(),
            });
        }
        log.posts.push(post.clone());
        Ok(())
    }

    async fn query_by_friends(
        &self,
        _user: UserId,
        friends: &[UserId],
        window: FeedWindow,
    ) -> Result<Vec<Post>, RepoError> {
        let authors: HashSet<UserId> = friends.iter().copied().collect();
        let log = rw_read(&self.log, LOCK_TARGET, "post_store.query_by_friends");

        let matching = log
            .posts
            .iter()
            .rev()
            .filter(|post| authors.contains(&post.author))
            .skip(window.start());

        let posts = match window.limit {
            Limit::Bounded(limit) => matching.take(limit as usize).cloned().collect(),
            Limit::Unbounded => matching.cloned().collect(),
        };
        Ok(posts)
    }
}

/// Undirected friendship graph.
#[derive(Default)]
pub struct MemoryFriendGraph {
    edges: RwLock<HashMap<UserId, BTreeSet<UserId>>>,
}

impl MemoryFriendGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `a` and `b` as friends of each other. Self-edges are ignored.
    pub fn add_friendship(&self, a: UserId, b: UserId) {
        if a == b {
            return;
        }
        let mut edges = rw_write(&self.edges, LOCK_TARGET, "friend_graph.add_friendship");
        edges.entry(a).or_default().insert(b);
        edges.entry(b).or_default().insert(a);
    }

    /// Make `user` known without giving them any friends.
    pub fn add_user(&self, user: UserId) {
        rw_write(&self.edges, LOCK_TARGET, "friend_graph.add_user")
            .entry(user)
            .or_default();
    }
}

#[async_trait]
impl FriendGraph for MemoryFriendGraph {
    async fn friends_of(&self, user: UserId) -> Result<Vec<UserId>, RepoError> {
        let edges = rw_read(&self.edges, LOCK_TARGET, "friend_graph.friends_of");
        Ok(edges
            .get(&user)
            .map(|friends| friends.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl UserDirectory for MemoryFriendGraph {
    async fn list_user_ids(&self) -> Result<Vec<UserId>, RepoError> {
        let edges = rw_read(&self.edges, LOCK_TARGET, "friend_graph.list_user_ids");
        let mut users: Vec<UserId> = edges.keys().copied().collect();
        users.sort();
        Ok(users)
    }
}
