//! Group membership record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator between group and user ID in composite membership keys.
pub const MEMBER_KEY_SEPARATOR: char = ':';

/// Build the composite cache key for a membership.
pub fn member_key(group_id: &str, user_id: &str) -> String {
    format!("{group_id}{MEMBER_KEY_SEPARATOR}{user_id}")
}

/// A user's membership in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Group the membership belongs to.
    pub group_id: String,
    /// Remote user ID.
    pub user_id: String,
    /// Account username.
    pub username: String,
    /// Per-group display name, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Role IDs held in this group.
    #[serde(default)]
    pub role_ids: Vec<String>,
    /// When the user joined, if the platform reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_bot: bool,
}

impl Member {
    /// Create a membership with only the identifying fields set.
    pub fn new(
        group_id: impl Into<String>,
        user_id: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            user_id: user_id.into(),
            username: username.into(),
            display_name: None,
            role_ids: Vec::new(),
            joined_at: None,
            is_bot: false,
        }
    }

    /// Composite cache key of this membership.
    pub fn key(&self) -> String {
        member_key(&self.group_id, &self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_key_joins_ids() {
        assert_eq!(member_key("g1", "u1"), "g1:u1");
        assert_eq!(Member::new("g1", "u1", "alice").key(), "g1:u1");
    }
}
