//! Replication tracking for individual object-created records.
//!
//! Correlates a storage event back to an attachment through the ephemeral
//! upload lookup, applies the idempotent state update, and hands off to the
//! completion aggregator. A lookup miss is the idempotency point: duplicate
//! deliveries and unrelated objects are skipped silently.

use tracing::{debug, info, warn};

use super::completion::{self, CompletionOutcome};
use super::events::ObjectCreated;
use super::ProcessContext;

/// Key prefix for upload lookup entries (`file name -> attachment id`).
pub const LOOKUP_KEY_PREFIX: &str = "attachment_upload:";

pub fn lookup_key(file_name: &str) -> String {
    format!("{LOOKUP_KEY_PREFIX}{file_name}")
}

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Lookup miss, stale mapping, or a store failure: logged, siblings
    /// unaffected.
    Skipped,
    Applied {
        story_completed: bool,
        notified: bool,
    },
}

/// Apply a single object-created record.
///
/// Never fails the batch: every failure path degrades to `Skipped` with a
/// log line. The consumed lookup entry is deleted at the end of every
/// hit path; deletion failures are logged only.
pub async fn apply_record(ctx: &ProcessContext, record: &ObjectCreated) -> RecordOutcome {
    let key = lookup_key(&record.file_name);

    let attachment_id = match ctx.kv.get(&key).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            debug!(file_name = %record.file_name, "replication_lookup_miss");
            return RecordOutcome::Skipped;
        }
        Err(e) => {
            warn!(file_name = %record.file_name, error = %e, "replication_lookup_failed");
            return RecordOutcome::Skipped;
        }
    };

    let outcome = match ctx
        .records
        .mark_replicated(&attachment_id, record.size, record.content_hash.as_deref())
        .await
    {
        Ok(Some(attachment)) => {
            info!(
                attachment_id = %attachment.id,
                story_id = %attachment.story_id,
                file_name = %attachment.file_name,
                size = attachment.size,
                "attachment_replicated"
            );
            match completion::settle_story(ctx, &attachment.story_id).await {
                Ok(CompletionOutcome { completed, notified }) => RecordOutcome::Applied {
                    story_completed: completed,
                    notified,
                },
                Err(e) => {
                    warn!(
                        story_id = %attachment.story_id,
                        error = %e,
                        "story_completion_check_failed"
                    );
                    RecordOutcome::Applied {
                        story_completed: false,
                        notified: false,
                    }
                }
            }
        }
        Ok(None) => {
            warn!(
                attachment_id = %attachment_id,
                file_name = %record.file_name,
                "replication_lookup_stale"
            );
            RecordOutcome::Skipped
        }
        Err(e) => {
            warn!(
                attachment_id = %attachment_id,
                error = %e,
                "attachment_update_failed"
            );
            RecordOutcome::Skipped
        }
    };

    if let Err(e) = ctx.kv.del(&key).await {
        warn!(file_name = %record.file_name, error = %e, "lookup_cleanup_failed");
    }

    outcome
}
