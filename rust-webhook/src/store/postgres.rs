//! PostgreSQL-backed store implementations.
//!
//! Two stores share one pool: [`PgRecordStore`] for durable attachment and
//! story rows, and [`PgKv`] for the ephemeral TTL entries written by the
//! upload path. `DELETE ... RETURNING` on a live row gives `PgKv::del` the
//! atomic consume semantics the completion aggregator depends on.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use super::records::{AttachmentRecord, RecordStore, StoryRecord};
use super::{KvStore, StoreResult};

/// Connect a shared pool for both Postgres-backed stores.
pub async fn connect_pool(url: &str, max_connections: u32) -> StoreResult<Pool<Postgres>> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(url)
        .await?;
    Ok(pool)
}

/// PostgreSQL-backed attachment and story state.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Pool<Postgres>,
}

impl PgRecordStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn mark_replicated(
        &self,
        attachment_id: &str,
        size: i64,
        content_hash: Option<&str>,
    ) -> StoreResult<Option<AttachmentRecord>> {
        let updated = sqlx::query_as::<_, AttachmentRecord>(
            "UPDATE attachments
             SET size = $2, content_hash = $3, replicated = TRUE
             WHERE id = $1
             RETURNING id, story_id, file_name, size, content_hash, replicated",
        )
        .bind(attachment_id)
        .bind(size)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn attachments_for_story(&self, story_id: &str) -> StoreResult<Vec<AttachmentRecord>> {
        let rows = sqlx::query_as::<_, AttachmentRecord>(
            "SELECT id, story_id, file_name, size, content_hash, replicated
             FROM attachments
             WHERE story_id = $1
             ORDER BY file_name",
        )
        .bind(story_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn set_story_replicating(&self, story_id: &str, replicating: bool) -> StoreResult<()> {
        sqlx::query("UPDATE stories SET replicating = $2 WHERE id = $1")
            .bind(story_id)
            .bind(replicating)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn story(&self, story_id: &str) -> StoreResult<Option<StoryRecord>> {
        let story = sqlx::query_as::<_, StoryRecord>(
            "SELECT s.id, s.title, u.email AS owner_email, s.replicating, s.created_at
             FROM stories s
             JOIN users u ON u.id = s.owner_id
             WHERE s.id = $1",
        )
        .bind(story_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(story)
    }
}

/// PostgreSQL-backed ephemeral key-value entries.
///
/// Rows past `expires_at` are treated as absent; expired rows are cleaned up
/// lazily on access.
#[derive(Clone)]
pub struct PgKv {
    pool: Pool<Postgres>,
}

impl PgKv {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvStore for PgKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM ephemeral_kv WHERE key = $1 AND expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO ephemeral_kv (key, value, expires_at)
             VALUES ($1, $2, NOW() + make_interval(secs => $3))
             ON CONFLICT (key)
             DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        // A single DELETE is atomic: of concurrent callers, at most one
        // deletes a live row.
        let consumed: Option<String> = sqlx::query_scalar(
            "DELETE FROM ephemeral_kv
             WHERE key = $1 AND expires_at > NOW()
             RETURNING key",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        // Sweep the expired row, if that is what blocked the delete.
        sqlx::query("DELETE FROM ephemeral_kv WHERE key = $1 AND expires_at <= NOW()")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(consumed.is_some())
    }
}
