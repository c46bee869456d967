//! Ephemeral TTL key-value store.
//!
//! Upload lookup entries and new-story markers live in an external
//! TTL-capable store. The service only needs three operations; `del` doubles
//! as the atomic check-and-delete that guarantees exactly-once notification.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::StoreResult;

/// Ephemeral key-value store with per-key TTL.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a live (non-expired) value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a value with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Delete a key, returning whether a live value existed.
    ///
    /// This is the consume-once primitive: of any number of concurrent
    /// callers, exactly one observes `true`.
    async fn del(&self, key: &str) -> StoreResult<bool>;
}

/// In-memory implementation with lazy expiry. Backs tests and local runs.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock().expect("kv mutex poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.lock().expect("kv mutex poisoned");
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().expect("kv mutex poisoned");
        match entries.remove(key) {
            Some(entry) => Ok(entry.expires_at > Instant::now()),
            None => Ok(false),
        }
    }
}
