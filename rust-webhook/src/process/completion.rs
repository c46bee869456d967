//! Story completion aggregation.
//!
//! After every attachment update, the story's siblings are re-checked. When
//! the last one replicates, the aggregate flag flips (idempotently) and the
//! new-story marker decides who notifies: `del` on the marker is atomic, so
//! of any number of concurrent completers exactly one wins and sends the
//! archive email. Email failures are logged and never block anything -- the
//! marker is already consumed and the persisted state is already final.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info, warn};

use super::ProcessContext;
use crate::notify::Attachment;
use crate::store::{AttachmentRecord, StoreResult, StoryRecord};

/// Key prefix for new-story markers (consume-once notification guard).
pub const MARKER_KEY_PREFIX: &str = "new_story:";

pub fn marker_key(story_id: &str) -> String {
    format!("{MARKER_KEY_PREFIX}{story_id}")
}

/// What the aggregator did for one story check.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOutcome {
    /// All siblings replicated; the story flag is now false.
    pub completed: bool,
    /// This caller consumed the marker and the email went out.
    pub notified: bool,
}

/// Re-check a story after one of its attachments replicated.
pub async fn settle_story(
    ctx: &ProcessContext,
    story_id: &str,
) -> StoreResult<CompletionOutcome> {
    let siblings = ctx.records.attachments_for_story(story_id).await?;

    if siblings.is_empty() {
        warn!(story_id = %story_id, "story_has_no_attachments");
        return Ok(CompletionOutcome::default());
    }

    if !siblings.iter().all(|a| a.replicated) {
        return Ok(CompletionOutcome::default());
    }

    // Idempotent: re-setting false is harmless under redelivery.
    ctx.records.set_story_replicating(story_id, false).await?;

    info!(
        story_id = %story_id,
        attachments = siblings.len(),
        "story_replication_complete"
    );

    let consumed = match ctx.kv.del(&marker_key(story_id)).await {
        Ok(consumed) => consumed,
        Err(e) => {
            warn!(story_id = %story_id, error = %e, "marker_consume_failed");
            false
        }
    };

    if !consumed {
        // Redelivery, a concurrent winner, or an edit cycle with no new
        // creation. Terminal either way.
        return Ok(CompletionOutcome {
            completed: true,
            notified: false,
        });
    }

    let story = match ctx.records.story(story_id).await? {
        Some(story) => story,
        None => {
            warn!(story_id = %story_id, "story_missing_for_notification");
            return Ok(CompletionOutcome {
                completed: true,
                notified: false,
            });
        }
    };

    let notified = match send_completion_email(ctx, &story, &siblings).await {
        Ok(()) => true,
        Err(e) => {
            error!(story_id = %story_id, error = %e, "completion_email_failed");
            false
        }
    };

    Ok(CompletionOutcome {
        completed: true,
        notified,
    })
}

async fn send_completion_email(
    ctx: &ProcessContext,
    story: &StoryRecord,
    siblings: &[AttachmentRecord],
) -> Result<()> {
    let manifest = build_manifest(story, siblings)?;

    let subject = format!("\"{}\" has finished archiving", story.title);
    let text = format!(
        "All {} attachments of \"{}\" are safely replicated to archive storage.\n\
         The attached manifest lists every archived file.",
        siblings.len(),
        story.title
    );
    let html = format!(
        "<p>All {} attachments of <strong>{}</strong> are safely replicated \
         to archive storage.</p><p>The attached manifest lists every archived \
         file.</p>",
        siblings.len(),
        story.title
    );

    ctx.notifier
        .send(&story.owner_email, &subject, &text, &html, vec![manifest])
        .await
}

#[derive(Serialize)]
struct Manifest<'a> {
    story_id: &'a str,
    title: &'a str,
    owner: &'a str,
    created: String,
    attachments: Vec<ManifestEntry<'a>>,
}

#[derive(Serialize)]
struct ManifestEntry<'a> {
    id: &'a str,
    file_name: &'a str,
    content_type: &'static str,
    size: i64,
    content_hash: Option<&'a str>,
}

/// Assemble the archive manifest in memory, ready to attach.
fn build_manifest(story: &StoryRecord, siblings: &[AttachmentRecord]) -> Result<Attachment> {
    let manifest = Manifest {
        story_id: &story.id,
        title: &story.title,
        owner: &story.owner_email,
        created: story.created_at.format("%B %e, %Y at %H:%M UTC").to_string(),
        attachments: siblings
            .iter()
            .map(|a| ManifestEntry {
                id: &a.id,
                file_name: &a.file_name,
                content_type: content_type_for(&a.file_name),
                size: a.size,
                content_hash: a.content_hash.as_deref(),
            })
            .collect(),
    };

    let data = serde_json::to_vec_pretty(&manifest).context("Failed to serialize manifest")?;

    Ok(Attachment {
        file_name: "archive-manifest.json".to_string(),
        content_type: "application/json".to_string(),
        data,
    })
}

/// MIME type from the file extension; unknown extensions are opaque bytes.
fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::process::testutil::{failing_context, test_context, TestContext};
    use crate::store::{KvStore, RecordStore};

    async fn seed_story(ctx: &TestContext, story_id: &str, files: &[(&str, &str, bool)]) {
        ctx.records
            .insert_story(StoryRecord {
                id: story_id.to_string(),
                title: "Summer Trip".to_string(),
                owner_email: "owner@example.com".to_string(),
                replicating: true,
                created_at: Utc::now(),
            })
            .await;
        for (id, file_name, replicated) in files {
            ctx.records
                .insert_attachment(AttachmentRecord {
                    id: id.to_string(),
                    story_id: story_id.to_string(),
                    file_name: file_name.to_string(),
                    size: 100,
                    content_hash: None,
                    replicated: *replicated,
                })
                .await;
        }
    }

    #[tokio::test]
    async fn test_incomplete_story_stays_replicating() {
        let ctx = test_context();
        seed_story(&ctx, "s1", &[("a1", "one.jpg", true), ("a2", "two.jpg", false)]).await;

        let outcome = settle_story(&ctx.ctx, "s1").await.unwrap();
        assert_eq!(outcome, CompletionOutcome::default());
        assert!(ctx.records.story("s1").await.unwrap().unwrap().replicating);
        assert_eq!(ctx.notifier.sent(), 0);
    }

    #[tokio::test]
    async fn test_complete_story_flips_flag_and_notifies_once() {
        let ctx = test_context();
        seed_story(&ctx, "s1", &[("a1", "one.jpg", true), ("a2", "two.jpg", true)]).await;
        ctx.kv
            .set(&marker_key("s1"), "true", Duration::from_secs(1800))
            .await
            .unwrap();

        let outcome = settle_story(&ctx.ctx, "s1").await.unwrap();
        assert!(outcome.completed);
        assert!(outcome.notified);
        assert!(!ctx.records.story("s1").await.unwrap().unwrap().replicating);
        assert_eq!(ctx.notifier.sent(), 1);

        // Redelivery: still complete, but the marker is gone.
        let again = settle_story(&ctx.ctx, "s1").await.unwrap();
        assert!(again.completed);
        assert!(!again.notified);
        assert_eq!(ctx.notifier.sent(), 1);
    }

    #[tokio::test]
    async fn test_complete_without_marker_sends_nothing() {
        let ctx = test_context();
        seed_story(&ctx, "s1", &[("a1", "one.jpg", true)]).await;

        let outcome = settle_story(&ctx.ctx, "s1").await.unwrap();
        assert!(outcome.completed);
        assert!(!outcome.notified);
        assert_eq!(ctx.notifier.sent(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_completion_notifies_exactly_once() {
        let ctx = test_context();
        seed_story(&ctx, "s1", &[("a1", "one.jpg", true), ("a2", "two.jpg", true)]).await;
        ctx.kv
            .set(&marker_key("s1"), "true", Duration::from_secs(1800))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let task_ctx = ctx.ctx.clone();
            handles.push(tokio::spawn(async move {
                settle_story(&task_ctx, "s1").await.unwrap()
            }));
        }

        let mut notified = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert!(outcome.completed);
            if outcome.notified {
                notified += 1;
            }
        }
        assert_eq!(notified, 1);
        assert_eq!(ctx.notifier.sent(), 1);
    }

    #[tokio::test]
    async fn test_email_failure_does_not_block_completion() {
        let ctx = failing_context();
        seed_story(&ctx, "s1", &[("a1", "one.jpg", true)]).await;
        ctx.kv
            .set(&marker_key("s1"), "true", Duration::from_secs(1800))
            .await
            .unwrap();

        let outcome = settle_story(&ctx.ctx, "s1").await.unwrap();
        assert!(outcome.completed);
        // The attempt happened but failed, so it does not count as notified.
        assert_eq!(ctx.notifier.sent(), 1);
        assert!(!outcome.notified);
        // Marker stays consumed even though the send failed.
        assert!(!ctx.kv.del(&marker_key("s1")).await.unwrap());
        assert!(!ctx.records.story("s1").await.unwrap().unwrap().replicating);
    }

    #[tokio::test]
    async fn test_manifest_contents() {
        let story = StoryRecord {
            id: "s1".to_string(),
            title: "Summer Trip".to_string(),
            owner_email: "owner@example.com".to_string(),
            replicating: false,
            created_at: Utc::now(),
        };
        let siblings = vec![AttachmentRecord {
            id: "a1".to_string(),
            story_id: "s1".to_string(),
            file_name: "beach.jpg".to_string(),
            size: 2048,
            content_hash: Some("abc".to_string()),
            replicated: true,
        }];

        let manifest = build_manifest(&story, &siblings).unwrap();
        assert_eq!(manifest.file_name, "archive-manifest.json");
        assert_eq!(manifest.content_type, "application/json");

        let parsed: serde_json::Value = serde_json::from_slice(&manifest.data).unwrap();
        assert_eq!(parsed["story_id"], "s1");
        assert_eq!(parsed["attachments"][0]["file_name"], "beach.jpg");
        assert_eq!(parsed["attachments"][0]["content_type"], "image/jpeg");
        assert_eq!(parsed["attachments"][0]["size"], 2048);
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("clip.mp4"), "video/mp4");
        assert_eq!(content_type_for("notes"), "application/octet-stream");
        assert_eq!(content_type_for("weird.xyz"), "application/octet-stream");
    }
}
