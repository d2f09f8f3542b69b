//! Durable store contract used by the cache.
//!
//! Two concerns live here: persisted cache rows (`key`, `type_tag`, JSON
//! payload, expiry) and per-member facts (join time and role set), each with
//! a `last_touched` stamp that an external cleanup uses to reclaim rows.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::error::Result;

/// A persisted cache row as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    pub payload: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Rows removed by an obsolescence sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub cache_entries: u64,
    pub member_joins: u64,
    pub member_roles: u64,
}

impl CleanupSummary {
    pub fn total(&self) -> u64 {
        self.cache_entries + self.member_joins + self.member_roles
    }
}

/// Durable key-value and member-fact storage.
///
/// Implementations must be safe for concurrent use; callers add no locking.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Insert or replace the cache row identified by `(key, type_tag)`.
    async fn upsert_cache_entry(
        &self,
        key: &str,
        type_tag: &str,
        payload: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// All cache rows with the given type tag.
    async fn get_cache_entries_by_type(&self, type_tag: &str) -> Result<Vec<StoredEntry>>;

    /// Record (or overwrite) when a member joined a group.
    async fn upsert_member_join(
        &self,
        group_id: &str,
        member_id: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Record a join time only if none exists yet; an existing row is just
    /// touched. Returns `true` if a row was created.
    async fn insert_member_join(
        &self,
        group_id: &str,
        member_id: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Join time of a member, if recorded.
    async fn get_member_join(&self, group_id: &str, member_id: &str)
    -> Result<Option<DateTime<Utc>>>;

    /// Every recorded join time in a group, keyed by member ID.
    async fn get_all_member_joins(&self, group_id: &str) -> Result<HashMap<String, DateTime<Utc>>>;

    /// Refresh `last_touched` of a join fact without changing it. No-op if absent.
    async fn touch_member_join(&self, group_id: &str, member_id: &str) -> Result<()>;

    /// Record (or overwrite) the role set of a member.
    async fn upsert_member_roles(
        &self,
        group_id: &str,
        member_id: &str,
        role_ids: &[String],
        observed_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Role set of a member; empty if none recorded.
    async fn get_member_roles(&self, group_id: &str, member_id: &str) -> Result<Vec<String>>;

    /// Refresh `last_touched` of a role fact without changing it. No-op if absent.
    async fn touch_member_roles(&self, group_id: &str, member_id: &str) -> Result<()>;

    /// Drop facts not touched within the retention window and expired cache rows.
    async fn cleanup_all_obsolete_data(&self) -> Result<CleanupSummary>;
}

/// Oldest `last_touched` that survives a cleanup at `now`.
pub fn retention_cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(retention)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
