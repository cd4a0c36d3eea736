use std::future::Future;
use uuid::Uuid;

use super::schema::Database;
use super::types::{CreatePostParams, DatabaseError, Feed, Post};

/// The narrow store interface the polling core depends on.
///
/// Implementations must be safe to share across concurrently running
/// pipeline tasks; the core performs no locking of its own.
pub trait FeedStore: Send + Sync + 'static {
    /// Up to `limit` feeds due for fetching, in the store's priority order.
    fn select_due_feeds(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Feed>, DatabaseError>> + Send;

    /// Record that `feed_id` is being fetched now.
    fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
    ) -> impl Future<Output = Result<Feed, DatabaseError>> + Send;

    /// Persist one post.
    fn insert_post(
        &self,
        params: CreatePostParams,
    ) -> impl Future<Output = Result<Post, DatabaseError>> + Send;
}

impl FeedStore for Database {
    async fn select_due_feeds(&self, limit: usize) -> Result<Vec<Feed>, DatabaseError> {
        self.get_next_feeds_to_fetch(limit).await
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<Feed, DatabaseError> {
        self.mark_feed_as_fetched(feed_id).await
    }

    async fn insert_post(&self, params: CreatePostParams) -> Result<Post, DatabaseError> {
        self.create_post(&params).await
    }
}
