//! Durable attachment and story state.
//!
//! Attachments carry the per-object replication flag; stories carry the
//! aggregate `replicating` flag that flips exactly once per creation cycle.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::StoreResult;

/// One uploaded media object tracked through replication.
///
/// `replicated` only ever transitions false -> true; repeating the same
/// update is a no-op in effect.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AttachmentRecord {
    pub id: String,
    pub story_id: String,
    pub file_name: String,
    pub size: i64,
    pub content_hash: Option<String>,
    pub replicated: bool,
}

/// The owning story, with the aggregate replication flag and the owner
/// address used for the completion notification.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoryRecord {
    pub id: String,
    pub title: String,
    pub owner_email: String,
    pub replicating: bool,
    pub created_at: DateTime<Utc>,
}

/// Read/update access to attachment and story state.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Mark an attachment replicated, recording its size and content hash.
    ///
    /// Idempotent upsert: safe to repeat for at-least-once delivery. Returns
    /// the updated record, or `None` if no such attachment exists.
    async fn mark_replicated(
        &self,
        attachment_id: &str,
        size: i64,
        content_hash: Option<&str>,
    ) -> StoreResult<Option<AttachmentRecord>>;

    /// All attachments belonging to a story.
    async fn attachments_for_story(&self, story_id: &str) -> StoreResult<Vec<AttachmentRecord>>;

    /// Set the story's aggregate `replicating` flag. Idempotent.
    async fn set_story_replicating(&self, story_id: &str, replicating: bool) -> StoreResult<()>;

    /// Fetch a story with its owner's notification address.
    async fn story(&self, story_id: &str) -> StoreResult<Option<StoryRecord>>;
}

/// In-memory implementation backing tests and local runs.
#[derive(Default)]
pub struct MemoryRecordStore {
    attachments: RwLock<HashMap<String, AttachmentRecord>>,
    stories: RwLock<HashMap<String, StoryRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_story(&self, story: StoryRecord) {
        self.stories.write().await.insert(story.id.clone(), story);
    }

    pub async fn insert_attachment(&self, attachment: AttachmentRecord) {
        self.attachments
            .write()
            .await
            .insert(attachment.id.clone(), attachment);
    }

    pub async fn attachment(&self, id: &str) -> Option<AttachmentRecord> {
        self.attachments.read().await.get(id).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn mark_replicated(
        &self,
        attachment_id: &str,
        size: i64,
        content_hash: Option<&str>,
    ) -> StoreResult<Option<AttachmentRecord>> {
        let mut attachments = self.attachments.write().await;
        match attachments.get_mut(attachment_id) {
            Some(record) => {
                record.size = size;
                record.content_hash = content_hash.map(str::to_string);
                record.replicated = true;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn attachments_for_story(&self, story_id: &str) -> StoreResult<Vec<AttachmentRecord>> {
        let attachments = self.attachments.read().await;
        let mut siblings: Vec<AttachmentRecord> = attachments
            .values()
            .filter(|a| a.story_id == story_id)
            .cloned()
            .collect();
        siblings.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(siblings)
    }

    async fn set_story_replicating(&self, story_id: &str, replicating: bool) -> StoreResult<()> {
        let mut stories = self.stories.write().await;
        if let Some(story) = stories.get_mut(story_id) {
            story.replicating = replicating;
        }
        Ok(())
    }

    async fn story(&self, story_id: &str) -> StoreResult<Option<StoryRecord>> {
        Ok(self.stories.read().await.get(story_id).cloned())
    }
}
