use chrono::Utc;
use uuid::Uuid;

use super::schema::Database;
use super::types::{DatabaseError, Feed};

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed, returning the stored row.
    ///
    /// Fails with [`DatabaseError::Constraint`] when the URL is already
    /// registered.
    pub async fn create_feed(&self, name: &str, url: &str) -> Result<Feed, DatabaseError> {
        let now = Utc::now();
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            INSERT INTO feeds (id, created_at, updated_at, name, url, last_fetched_at)
            VALUES (?, ?, ?, ?, ?, NULL)
            RETURNING id, created_at, updated_at, name, url, last_fetched_at
        "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(name)
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_write)?;

        Ok(feed)
    }

    /// Get a single feed by ID
    pub async fn get_feed(&self, feed_id: Uuid) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, created_at, updated_at, name, url, last_fetched_at
            FROM feeds
            WHERE id = ?
        "#,
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(feed)
    }

    /// Select up to `limit` feeds that are due for fetching.
    ///
    /// Feeds that were never fetched come first, then the least recently
    /// fetched ones. Ties break on name so batches are deterministic.
    pub async fn get_next_feeds_to_fetch(&self, limit: usize) -> Result<Vec<Feed>, DatabaseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let feeds = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, created_at, updated_at, name, url, last_fetched_at
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, name ASC
            LIMIT ?
        "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    /// Set `last_fetched_at` (and `updated_at`) to now, returning the updated row.
    pub async fn mark_feed_as_fetched(&self, feed_id: Uuid) -> Result<Feed, DatabaseError> {
        let now = Utc::now();
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            UPDATE feeds SET last_fetched_at = ?, updated_at = ?
            WHERE id = ?
            RETURNING id, created_at, updated_at, name, url, last_fetched_at
        "#,
        )
        .bind(now)
        .bind(now)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        feed.ok_or(DatabaseError::NotFound(feed_id))
    }
}
