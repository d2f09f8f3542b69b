//! Persisted cache row.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::database::StoredEntry;

/// One cache entry as stored in `cache_entries`.
///
/// Timestamps are unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub key: String,

    /// Entity kind (`member`, `group`, `roles`, `channel`).
    pub type_tag: String,

    /// JSON-encoded entity.
    pub payload: String,

    #[serde(default)]
    pub expires_at: Option<i64>,

    pub updated_at: i64,
}

impl From<CacheEntryDoc> for StoredEntry {
    fn from(doc: CacheEntryDoc) -> Self {
        Self {
            key: doc.key,
            payload: doc.payload,
            expires_at: doc.expires_at.and_then(DateTime::<Utc>::from_timestamp_millis),
        }
    }
}
