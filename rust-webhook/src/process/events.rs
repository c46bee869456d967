//! Storage event extraction.
//!
//! A Notification's `Message` field carries a nested JSON document from the
//! object store. Only object-created events matter; everything else is
//! opaque and processing it is a no-op success.

use serde::Deserialize;
use tracing::{debug, warn};
use url::form_urlencoded;

/// Subject value marking a storage-object notification.
pub const S3_NOTIFICATION_SUBJECT: &str = "Amazon S3 Notification";

/// Event-name family for newly created objects (`ObjectCreated:Put`,
/// `ObjectCreated:CompleteMultipartUpload`, ...).
pub const OBJECT_CREATED_PREFIX: &str = "ObjectCreated:";

/// One qualifying object-created record.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectCreated {
    /// Last path segment of the object key.
    pub file_name: String,
    /// Full object key, url-decoded.
    pub key: String,
    /// Object size in bytes.
    pub size: i64,
    /// Normalized content hash (eTag with quote characters stripped).
    pub content_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S3EventDocument {
    #[serde(rename = "Records", default)]
    records: Vec<S3EventRecord>,
}

#[derive(Debug, Deserialize)]
struct S3EventRecord {
    #[serde(rename = "eventName", default)]
    event_name: String,
    #[serde(default)]
    s3: S3Entity,
}

#[derive(Debug, Default, Deserialize)]
struct S3Entity {
    #[serde(default)]
    object: S3ObjectRef,
}

#[derive(Debug, Default, Deserialize)]
struct S3ObjectRef {
    key: Option<String>,
    size: Option<i64>,
    #[serde(rename = "eTag")]
    e_tag: Option<String>,
}

/// Extract object-created records from a notification.
///
/// Returns an empty list when the subject does not mark a storage
/// notification, the payload is not the expected JSON shape, or no record
/// qualifies. A malformed record is logged and skipped without affecting its
/// siblings.
pub fn extract_object_created(subject: Option<&str>, message: &str) -> Vec<ObjectCreated> {
    if subject != Some(S3_NOTIFICATION_SUBJECT) {
        debug!(subject = ?subject, "notification_subject_not_storage");
        return Vec::new();
    }

    let document: S3EventDocument = match serde_json::from_str(message) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "storage_event_parse_failed");
            return Vec::new();
        }
    };

    let mut extracted = Vec::new();
    for record in document.records {
        if !record.event_name.starts_with(OBJECT_CREATED_PREFIX) {
            debug!(event_name = %record.event_name, "storage_event_ignored");
            continue;
        }

        let (Some(raw_key), Some(size)) = (record.s3.object.key, record.s3.object.size) else {
            warn!(event_name = %record.event_name, "storage_record_missing_key_or_size");
            continue;
        };

        let key = decode_key(&raw_key);
        let file_name = file_name_from_key(&key);
        if file_name.is_empty() {
            warn!(key = %key, "storage_record_empty_file_name");
            continue;
        }

        extracted.push(ObjectCreated {
            file_name: file_name.to_string(),
            size,
            content_hash: normalize_etag(record.s3.object.e_tag),
            key,
        });
    }

    extracted
}

/// Last `/`-separated segment of an object key.
fn file_name_from_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or("")
}

/// Object keys arrive form-encoded: `+` for spaces, percent escapes for the
/// rest, so `&` and `=` never appear literally. Decode before deriving the
/// file name or lookups for names with spaces would never match.
fn decode_key(raw: &str) -> String {
    let mut decoded = String::with_capacity(raw.len());
    for (name, value) in form_urlencoded::parse(raw.as_bytes()) {
        if !decoded.is_empty() {
            decoded.push('&');
        }
        decoded.push_str(&name);
        if !value.is_empty() {
            decoded.push('=');
            decoded.push_str(&value);
        }
    }
    decoded
}

/// Strip quote characters from an eTag; empty results count as absent.
fn normalize_etag(e_tag: Option<String>) -> Option<String> {
    e_tag
        .map(|tag| tag.replace('"', ""))
        .filter(|tag| !tag.is_empty())
}
