//! Home feed cache.
//!
//! Holds, per user, a bounded most-recent-first list of post snapshots that
//! is filled by fanout-on-write and by the cache warmer, never by reads.
//!
//! ```toml
//! [feed]
//! cache_capacity = 1000
//! ```

mod entry;
mod store;

/// Entries kept per user feed unless configured otherwise.
pub const DEFAULT_FEED_CAPACITY: usize = 1000;

pub use entry::FeedEntry;
pub use store::{CacheError, FeedCache, MemoryFeedCache};
