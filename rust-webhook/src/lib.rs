//! VaultWatch - replication tracking webhook service.
//!
//! Media attachments uploaded to a story are replicated asynchronously to
//! archive storage. The storage provider pushes signed pub/sub notifications
//! back to this service, which verifies them, updates per-attachment state,
//! and sends exactly one completion email per newly created story.
//!
//! ## Architecture
//!
//! ```text
//! Push notification -> Gate (validate + verify) -> Router
//!                       -> Event Extractor -> Tracker -> Completion
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod notify;
pub mod process;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use envelope::{Envelope, MessageKind};
pub use error::WebhookError;
pub use notify::{Attachment, MailgunNotifier, Notifier};
pub use process::{handle_notification, ProcessContext, ProcessSummary};
pub use store::{KvStore, RecordStore};
pub use web::{AppState, SignatureVerifier};
