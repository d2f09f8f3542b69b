//! In-memory durable store.
//!
//! Same semantics as the MongoDB store, backed by `DashMap`. Used when the
//! service runs without a database and as the store in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::store::{CleanupSummary, DurableStore, StoredEntry, retention_cutoff};
use crate::error::{MirrorError, Result};

type FactKey = (String, String); // (group_id, member_id)

#[derive(Debug, Clone)]
struct CacheRow {
    payload: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct JoinRow {
    joined_at: DateTime<Utc>,
    last_touched: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RolesRow {
    role_ids: Vec<String>,
    observed_at: DateTime<Utc>,
    last_touched: DateTime<Utc>,
}

/// `DashMap`-backed [`DurableStore`].
pub struct MemoryStore {
    cache_entries: DashMap<(String, String), CacheRow>, // (type_tag, key)
    member_joins: DashMap<FactKey, JoinRow>,
    member_roles: DashMap<FactKey, RolesRow>,
    retention: Duration,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store with the given fact retention window.
    pub fn new(retention: Duration) -> Self {
        Self {
            cache_entries: DashMap::new(),
            member_joins: DashMap::new(),
            member_roles: DashMap::new(),
            retention,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every write fail (for exercising error paths).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn cache_entry_count(&self) -> usize {
        self.cache_entries.len()
    }

    pub fn member_join_count(&self) -> usize {
        self.member_joins.len()
    }

    pub fn member_roles_count(&self) -> usize {
        self.member_roles.len()
    }

    /// `last_touched` of a join fact.
    pub fn join_last_touched(&self, group_id: &str, member_id: &str) -> Option<DateTime<Utc>> {
        self.member_joins
            .get(&fact_key(group_id, member_id))
            .map(|row| row.last_touched)
    }

    /// `last_touched` of a role fact.
    pub fn roles_last_touched(&self, group_id: &str, member_id: &str) -> Option<DateTime<Utc>> {
        self.member_roles
            .get(&fact_key(group_id, member_id))
            .map(|row| row.last_touched)
    }

    /// When the recorded role set was observed.
    pub fn roles_observed_at(&self, group_id: &str, member_id: &str) -> Option<DateTime<Utc>> {
        self.member_roles
            .get(&fact_key(group_id, member_id))
            .map(|row| row.observed_at)
    }

    /// Overwrite `last_touched` of both facts of a member (test helper for aging rows).
    pub fn backdate_facts(&self, group_id: &str, member_id: &str, at: DateTime<Utc>) {
        let key = fact_key(group_id, member_id);
        if let Some(mut row) = self.member_joins.get_mut(&key) {
            row.last_touched = at;
        }
        if let Some(mut row) = self.member_roles.get_mut(&key) {
            row.last_touched = at;
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(MirrorError::Store("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 86_400))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("cache_entries", &self.cache_entries.len())
            .field("member_joins", &self.member_joins.len())
            .field("member_roles", &self.member_roles.len())
            .finish()
    }
}

fn fact_key(group_id: &str, member_id: &str) -> FactKey {
    (group_id.to_string(), member_id.to_string())
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn upsert_cache_entry(
        &self,
        key: &str,
        type_tag: &str,
        payload: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.check_writable()?;
        self.cache_entries.insert(
            (type_tag.to_string(), key.to_string()),
            CacheRow {
                payload: payload.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_cache_entries_by_type(&self, type_tag: &str) -> Result<Vec<StoredEntry>> {
        Ok(self
            .cache_entries
            .iter()
            .filter(|row| row.key().0 == type_tag)
            .map(|row| StoredEntry {
                key: row.key().1.clone(),
                payload: row.payload.clone(),
                expires_at: row.expires_at,
            })
            .collect())
    }

    async fn upsert_member_join(
        &self,
        group_id: &str,
        member_id: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_writable()?;
        self.member_joins.insert(
            fact_key(group_id, member_id),
            JoinRow {
                joined_at,
                last_touched: Utc::now(),
            },
        );
        Ok(())
    }

    async fn insert_member_join(
        &self,
        group_id: &str,
        member_id: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now();
        let mut created = false;
        self.member_joins
            .entry(fact_key(group_id, member_id))
            .and_modify(|row| row.last_touched = now)
            .or_insert_with(|| {
                created = true;
                JoinRow {
                    joined_at,
                    last_touched: now,
                }
            });
        Ok(created)
    }

    async fn get_member_join(
        &self,
        group_id: &str,
        member_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .member_joins
            .get(&fact_key(group_id, member_id))
            .map(|row| row.joined_at))
    }

    async fn get_all_member_joins(&self, group_id: &str) -> Result<HashMap<String, DateTime<Utc>>> {
        Ok(self
            .member_joins
            .iter()
            .filter(|row| row.key().0 == group_id)
            .map(|row| (row.key().1.clone(), row.joined_at))
            .collect())
    }

    async fn touch_member_join(&self, group_id: &str, member_id: &str) -> Result<()> {
        self.check_writable()?;
        if let Some(mut row) = self.member_joins.get_mut(&fact_key(group_id, member_id)) {
            row.last_touched = Utc::now();
        }
        Ok(())
    }

    async fn upsert_member_roles(
        &self,
        group_id: &str,
        member_id: &str,
        role_ids: &[String],
        observed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_writable()?;
        self.member_roles.insert(
            fact_key(group_id, member_id),
            RolesRow {
                role_ids: role_ids.to_vec(),
                observed_at,
                last_touched: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_member_roles(&self, group_id: &str, member_id: &str) -> Result<Vec<String>> {
        Ok(self
            .member_roles
            .get(&fact_key(group_id, member_id))
            .map(|row| row.role_ids.clone())
            .unwrap_or_default())
    }

    async fn touch_member_roles(&self, group_id: &str, member_id: &str) -> Result<()> {
        self.check_writable()?;
        if let Some(mut row) = self.member_roles.get_mut(&fact_key(group_id, member_id)) {
            row.last_touched = Utc::now();
        }
        Ok(())
    }

    async fn cleanup_all_obsolete_data(&self) -> Result<CleanupSummary> {
        let now = Utc::now();
        let cutoff = retention_cutoff(now, self.retention);

        let before = self.cache_entries.len();
        self.cache_entries
            .retain(|_, row| row.expires_at.is_none_or(|at| at > now));
        let cache_entries = before.saturating_sub(self.cache_entries.len()) as u64;

        let before = self.member_joins.len();
        self.member_joins.retain(|_, row| row.last_touched >= cutoff);
        let member_joins = before.saturating_sub(self.member_joins.len()) as u64;

        let before = self.member_roles.len();
        self.member_roles.retain(|_, row| row.last_touched >= cutoff);
        let member_roles = before.saturating_sub(self.member_roles.len()) as u64;

        let summary = CleanupSummary {
            cache_entries,
            member_joins,
            member_roles,
        };
        debug!("MemoryStore cleanup removed {} rows", summary.total());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[tokio::test]
    async fn test_touch_keeps_payload() {
        let store = MemoryStore::default();
        let joined = Utc::now() - TimeDelta::days(3);
        store.upsert_member_join("g1", "u1", joined).await.unwrap();
        store.backdate_facts("g1", "u1", joined);

        store.touch_member_join("g1", "u1").await.unwrap();

        assert_eq!(store.get_member_join("g1", "u1").await.unwrap(), Some(joined));
        assert!(store.join_last_touched("g1", "u1").unwrap() > joined);
    }

    #[tokio::test]
    async fn test_insert_join_keeps_first_time() {
        let store = MemoryStore::default();
        let first = Utc::now() - TimeDelta::days(5);
        assert!(store.insert_member_join("g1", "u1", first).await.unwrap());
        store.backdate_facts("g1", "u1", first);

        assert!(!store.insert_member_join("g1", "u1", Utc::now()).await.unwrap());
        assert_eq!(store.get_member_join("g1", "u1").await.unwrap(), Some(first));
        assert!(store.join_last_touched("g1", "u1").unwrap() > first);
    }

    #[tokio::test]
    async fn test_role_upsert_touches_now() {
        let store = MemoryStore::default();
        let observed = Utc::now() - TimeDelta::days(40);
        store
            .upsert_member_roles("g1", "u1", &["r1".to_string()], observed)
            .await
            .unwrap();

        assert_eq!(store.roles_observed_at("g1", "u1"), Some(observed));
        assert!(store.roles_last_touched("g1", "u1").unwrap() > observed);

        // still fresh for a 30 day retention window
        store.cleanup_all_obsolete_data().await.unwrap();
        assert_eq!(store.member_roles_count(), 1);
    }

    #[tokio::test]
    async fn test_touch_missing_is_noop() {
        let store = MemoryStore::default();
        store.touch_member_roles("g1", "u1").await.unwrap();
        assert_eq!(store.member_roles_count(), 0);
        assert!(store.get_member_roles("g1", "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_entries_grouped_by_type() {
        let store = MemoryStore::default();
        store.upsert_cache_entry("g1", "group", "{}", None).await.unwrap();
        store.upsert_cache_entry("g1", "roles", "{}", None).await.unwrap();
        store.upsert_cache_entry("g1", "group", "{\"v\":2}", None).await.unwrap();

        let groups = store.get_cache_entries_by_type("group").await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].payload, "{\"v\":2}");
        assert_eq!(store.cache_entry_count(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_drops_stale_facts() {
        let store = MemoryStore::new(Duration::from_secs(86_400));
        let now = Utc::now();
        store.upsert_member_join("g1", "old", now).await.unwrap();
        store.upsert_member_roles("g1", "old", &["r1".to_string()], now).await.unwrap();
        store.upsert_member_join("g1", "new", now).await.unwrap();
        store.backdate_facts("g1", "old", now - TimeDelta::days(2));
        store
            .upsert_cache_entry("k", "group", "{}", Some(now - TimeDelta::seconds(1)))
            .await
            .unwrap();

        let summary = store.cleanup_all_obsolete_data().await.unwrap();

        assert_eq!(summary.member_joins, 1);
        assert_eq!(summary.member_roles, 1);
        assert_eq!(summary.cache_entries, 1);
        let joins = store.get_all_member_joins("g1").await.unwrap();
        assert!(joins.contains_key("new"));
        assert!(!joins.contains_key("old"));
    }
}
