use uuid::Uuid;

use super::schema::Database;
use super::types::{CreatePostParams, DatabaseError, Post};

/// Maximum number of posts returned by a single feed query (OOM protection)
const MAX_POSTS: i64 = 2000;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert one post.
    ///
    /// A duplicate URL or a dangling `feed_id` yields
    /// [`DatabaseError::Constraint`]; anything else is
    /// [`DatabaseError::Other`].
    pub async fn create_post(&self, params: &CreatePostParams) -> Result<Post, DatabaseError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, created_at, updated_at, title, description, published_at, url, feed_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, created_at, updated_at, title, description, published_at, url, feed_id
        "#,
        )
        .bind(params.id)
        .bind(params.created_at)
        .bind(params.updated_at)
        .bind(&params.title)
        .bind(&params.description)
        .bind(params.published_at)
        .bind(&params.url)
        .bind(params.feed_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_write)?;

        Ok(post)
    }

    /// Get posts for a feed, newest first
    pub async fn get_posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>, DatabaseError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, created_at, updated_at, title, description, published_at, url, feed_id
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC
            LIMIT ?
        "#,
        )
        .bind(feed_id)
        .bind(MAX_POSTS)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }
}
