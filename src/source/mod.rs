mod reddit;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Item;

pub use reddit::RedditClient;

/// A source response that may instead ask the caller to back off.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Ready(T),
    RateLimited(Duration),
}

/// Outcome of looking up a single item by permalink.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Item),
    NotFound,
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Up to `limit` of the newest items on the global stream, newest first.
    async fn fetch_recent(&self, limit: usize) -> Result<Fetched<Vec<Item>>>;

    /// Current state of the item at `permalink`.
    async fn fetch_by_permalink(&self, permalink: &str) -> Result<Fetched<Lookup>>;
}

#[async_trait]
impl<T: ContentSource + ?Sized> ContentSource for Arc<T> {
    async fn fetch_recent(&self, limit: usize) -> Result<Fetched<Vec<Item>>> {
        (**self).fetch_recent(limit).await
    }

    async fn fetch_by_permalink(&self, permalink: &str) -> Result<Fetched<Lookup>> {
        (**self).fetch_by_permalink(permalink).await
    }
}
