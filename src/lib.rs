//! Home feed materialization: fanout-on-write into bounded per-user feed
//! caches, with the post store as the fallback for reads the cache cannot
//! answer.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub(crate) mod util;
