//! Channel record.

use serde::{Deserialize, Serialize};

/// Kind of channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Text,
    Voice,
    Category,
    Announcement,
    Thread,
    Forum,
}

/// A channel inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub group_id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ChannelKind,
    #[serde(default)]
    pub position: i64,
    /// Parent category, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Channel {
    pub fn new(id: impl Into<String>, group_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group_id: group_id.into(),
            name: name.into(),
            kind: ChannelKind::Text,
            position: 0,
            parent_id: None,
        }
    }
}
