//! Notification processing pipeline.
//!
//! ```text
//! Notification -> events (extract) -> tracker (per record) -> completion
//! ```
//!
//! Each record is isolated: one malformed or unmatched record never affects
//! its siblings, and the whole pipeline runs to completion within the
//! enclosing HTTP request.

pub mod completion;
pub mod events;
pub mod tracker;

use std::sync::Arc;

use tracing::info;

pub use completion::{marker_key, CompletionOutcome, MARKER_KEY_PREFIX};
pub use events::{extract_object_created, ObjectCreated, S3_NOTIFICATION_SUBJECT};
pub use tracker::{apply_record, lookup_key, RecordOutcome, LOOKUP_KEY_PREFIX};

use crate::envelope::Envelope;
use crate::notify::Notifier;
use crate::store::{KvStore, RecordStore};

/// Collaborator handles the pipeline works against.
#[derive(Clone)]
pub struct ProcessContext {
    pub kv: Arc<dyn KvStore>,
    pub records: Arc<dyn RecordStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// Counters for one processed notification.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    pub records_seen: usize,
    pub records_applied: usize,
    pub stories_completed: usize,
    pub notifications_sent: usize,
}

/// Process one authenticated Notification envelope.
///
/// Opaque notifications (non-storage subject, unexpected payload) are a
/// no-op success.
pub async fn handle_notification(ctx: &ProcessContext, envelope: &Envelope) -> ProcessSummary {
    let records = extract_object_created(envelope.subject.as_deref(), &envelope.message);

    let mut summary = ProcessSummary {
        records_seen: records.len(),
        ..Default::default()
    };

    for record in &records {
        match apply_record(ctx, record).await {
            RecordOutcome::Applied {
                story_completed,
                notified,
            } => {
                summary.records_applied += 1;
                if story_completed {
                    summary.stories_completed += 1;
                }
                if notified {
                    summary.notifications_sent += 1;
                }
            }
            RecordOutcome::Skipped => {}
        }
    }

    info!(
        message_id = %envelope.message_id,
        records_seen = summary.records_seen,
        records_applied = summary.records_applied,
        stories_completed = summary.stories_completed,
        notifications_sent = summary.notifications_sent,
        "notification_processed"
    );

    summary
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::testutil::{test_context, TestContext};
    use super::*;
    use crate::envelope::MessageKind;
    use crate::store::{AttachmentRecord, KvStore, StoryRecord};

    fn notification(message: String) -> Envelope {
        Envelope {
            kind: MessageKind::Notification,
            message_id: "msg-1".to_string(),
            topic_arn: "arn:topic".to_string(),
            message,
            timestamp: "2024-01-01T00:00:00.000Z".to_string(),
            signature: None,
            signing_cert_url: None,
            subject: Some(S3_NOTIFICATION_SUBJECT.to_string()),
            token: None,
            subscribe_url: None,
        }
    }

    fn object_created_message(entries: &[(&str, i64)]) -> String {
        let records: Vec<serde_json::Value> = entries
            .iter()
            .map(|(key, size)| {
                serde_json::json!({
                    "eventName": "ObjectCreated:Put",
                    "s3": { "object": { "key": key, "size": size, "eTag": "\"abc\"" } }
                })
            })
            .collect();
        serde_json::json!({ "Records": records }).to_string()
    }

    async fn seed_story(ctx: &TestContext, story_id: &str, files: &[(&str, &str)]) {
        ctx.records
            .insert_story(StoryRecord {
                id: story_id.to_string(),
                title: "Trip".to_string(),
                owner_email: "owner@example.com".to_string(),
                replicating: true,
                created_at: Utc::now(),
            })
            .await;
        for (id, file_name) in files {
            ctx.records
                .insert_attachment(AttachmentRecord {
                    id: id.to_string(),
                    story_id: story_id.to_string(),
                    file_name: file_name.to_string(),
                    size: 0,
                    content_hash: None,
                    replicated: false,
                })
                .await;
            ctx.kv
                .set(&lookup_key(file_name), id, Duration::from_secs(3600))
                .await
                .unwrap();
        }
        ctx.kv
            .set(&marker_key(story_id), "true", Duration::from_secs(1800))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_attachment_story_end_to_end() {
        let ctx = test_context();
        seed_story(&ctx, "STORY1", &[("a1", "FILE1.jpg")]).await;

        let envelope = notification(object_created_message(&[(
            "stories/env/STORY1/FILE1.jpg",
            2048,
        )]));
        let summary = handle_notification(&ctx.ctx, &envelope).await;

        assert_eq!(summary.records_seen, 1);
        assert_eq!(summary.records_applied, 1);
        assert_eq!(summary.stories_completed, 1);
        assert_eq!(summary.notifications_sent, 1);

        let attachment = ctx.records.attachment("a1").await.unwrap();
        assert!(attachment.replicated);
        assert_eq!(attachment.size, 2048);
        assert!(!ctx.records.story("STORY1").await.unwrap().unwrap().replicating);
    }

    #[tokio::test]
    async fn test_completion_waits_for_last_sibling() {
        let ctx = test_context();
        seed_story(&ctx, "s1", &[("a1", "one.jpg"), ("a2", "two.jpg"), ("a3", "three.jpg")]).await;

        for (i, file) in ["one.jpg", "two.jpg"].iter().enumerate() {
            let key = format!("stories/env/s1/{file}");
            let envelope =
                notification(object_created_message(&[(key.as_str(), 100 + i as i64)]));
            let summary = handle_notification(&ctx.ctx, &envelope).await;
            assert_eq!(summary.stories_completed, 0, "completed early on {file}");
        }
        assert!(ctx.records.story("s1").await.unwrap().unwrap().replicating);

        let envelope =
            notification(object_created_message(&[("stories/env/s1/three.jpg", 300)]));
        let summary = handle_notification(&ctx.ctx, &envelope).await;
        assert_eq!(summary.stories_completed, 1);
        assert_eq!(summary.notifications_sent, 1);
        assert!(!ctx.records.story("s1").await.unwrap().unwrap().replicating);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent() {
        let ctx = test_context();
        seed_story(&ctx, "s1", &[("a1", "one.jpg")]).await;

        let envelope = notification(object_created_message(&[("stories/env/s1/one.jpg", 64)]));
        handle_notification(&ctx.ctx, &envelope).await;
        let replay = handle_notification(&ctx.ctx, &envelope).await;

        // Lookup entry already consumed: replay skips silently.
        assert_eq!(replay.records_applied, 0);
        assert_eq!(ctx.notifier.sent(), 1);

        let attachment = ctx.records.attachment("a1").await.unwrap();
        assert!(attachment.replicated);
        assert_eq!(attachment.size, 64);
    }

    #[tokio::test]
    async fn test_opaque_notification_is_noop() {
        let ctx = test_context();
        let mut envelope = notification("just text".to_string());
        envelope.subject = Some("Something else".to_string());

        let summary = handle_notification(&ctx.ctx, &envelope).await;
        assert_eq!(summary, ProcessSummary::default());
    }

    #[tokio::test]
    async fn test_batch_isolates_bad_records() {
        let ctx = test_context();
        seed_story(&ctx, "s1", &[("a1", "good.jpg")]).await;

        // One unmatched record, one record for a seeded attachment.
        let envelope = notification(object_created_message(&[
            ("stories/env/s1/unrelated.jpg", 1),
            ("stories/env/s1/good.jpg", 2),
        ]));
        let summary = handle_notification(&ctx.ctx, &envelope).await;

        assert_eq!(summary.records_seen, 2);
        assert_eq!(summary.records_applied, 1);
        assert!(ctx.records.attachment("a1").await.unwrap().replicated);
    }
}
