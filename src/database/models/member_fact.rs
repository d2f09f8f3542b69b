//! Durable member facts.
//!
//! Join time and role set are separate documents so each can be refreshed on
//! its own. `last_touched` is what the obsolescence cleanup looks at.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// When a member joined a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberJoinDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub group_id: String,
    pub member_id: String,

    /// Unix milliseconds.
    pub joined_at: i64,

    /// Unix milliseconds.
    pub last_touched: i64,
}

impl MemberJoinDoc {
    pub fn joined_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.joined_at).unwrap_or_default()
    }
}

/// Role set a member held when last observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRolesDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub group_id: String,
    pub member_id: String,

    #[serde(default)]
    pub role_ids: Vec<String>,

    /// Unix milliseconds.
    pub observed_at: i64,

    /// Unix milliseconds.
    pub last_touched: i64,
}
