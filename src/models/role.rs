//! Role records.
//!
//! The platform only ever hands out a group's full role list, so the cache
//! stores [`RoleList`] per group rather than individual roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single role in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    /// Position in the role hierarchy (higher is more senior).
    #[serde(default)]
    pub position: i64,
    /// Permission bitset as reported by the platform.
    #[serde(default)]
    pub permissions: u64,
    #[serde(default)]
    pub color: u32,
    /// Role managed by an integration (cannot be assigned manually).
    #[serde(default)]
    pub managed: bool,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position: 0,
            permissions: 0,
            color: 0,
            managed: false,
        }
    }
}

/// Complete role list of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleList {
    pub group_id: String,
    pub roles: Vec<Role>,
    /// When the list was fetched from the platform.
    pub fetched_at: DateTime<Utc>,
}

impl RoleList {
    /// Wrap a freshly fetched role list.
    pub fn new(group_id: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            group_id: group_id.into(),
            roles,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }
}
