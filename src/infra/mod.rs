pub mod cache_warmer;
pub mod db;
pub mod error;
pub mod http;
pub mod memory;
pub mod notifier;
pub mod telemetry;
