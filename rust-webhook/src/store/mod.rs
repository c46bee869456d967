//! Storage collaborators.
//!
//! Two seams, both behind async traits so core logic stays storage-agnostic:
//! - [`kv`]: ephemeral TTL key-value entries (upload lookups, completion
//!   markers). `del` is the atomic consume primitive.
//! - [`records`]: durable attachment and story state.
//!
//! [`postgres`] provides the production implementations; the in-memory
//! implementations back tests and local runs.

pub mod kv;
pub mod postgres;
pub mod records;

use thiserror::Error;

pub use kv::{KvStore, MemoryKv};
pub use postgres::{PgKv, PgRecordStore};
pub use records::{AttachmentRecord, MemoryRecordStore, RecordStore, StoryRecord};

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("key-value store error: {0}")]
    Kv(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
