pub mod error;
pub mod feed;
pub mod notifier;
pub mod observer;
pub mod pagination;
pub mod repos;
