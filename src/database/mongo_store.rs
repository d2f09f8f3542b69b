//! MongoDB-backed durable store.
//!
//! Collections:
//! - `cache_entries`  - persisted cache rows, unique on `(key, type_tag)`
//! - `member_joins`   - join facts, unique on `(group_id, member_id)`
//! - `member_roles`   - role facts, unique on `(group_id, member_id)`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use mongodb::bson::{Document, doc};
use mongodb::options::{IndexOptions, UpdateOptions};
use mongodb::{Collection, IndexModel};
use tracing::{debug, info, warn};

use super::Database;
use super::models::{CacheEntryDoc, MemberJoinDoc, MemberRolesDoc};
use super::store::{CleanupSummary, DurableStore, StoredEntry, retention_cutoff};
use crate::error::Result;

/// [`DurableStore`] on top of MongoDB.
pub struct MongoStore {
    cache_entries: Collection<CacheEntryDoc>,
    member_joins: Collection<MemberJoinDoc>,
    member_roles: Collection<MemberRolesDoc>,
    /// Facts not touched within this window are removed by cleanup.
    retention: Duration,
}

impl MongoStore {
    /// Create a store over the given database.
    pub fn new(db: &Database, retention: Duration) -> Self {
        Self {
            cache_entries: db.collection("cache_entries"),
            member_joins: db.collection("member_joins"),
            member_roles: db.collection("member_roles"),
            retention,
        }
    }

    /// Create the unique indexes the upserts rely on. Safe to call repeatedly.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique = IndexOptions::builder().unique(true).build();
        let fact_keys = doc! { "group_id": 1, "member_id": 1 };

        self.cache_entries
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "key": 1, "type_tag": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;

        self.member_joins
            .create_index(
                IndexModel::builder()
                    .keys(fact_keys.clone())
                    .options(unique.clone())
                    .build(),
            )
            .await?;
        self.member_joins
            .create_index(IndexModel::builder().keys(doc! { "last_touched": 1 }).build())
            .await?;

        self.member_roles
            .create_index(IndexModel::builder().keys(fact_keys).options(unique).build())
            .await?;
        self.member_roles
            .create_index(IndexModel::builder().keys(doc! { "last_touched": 1 }).build())
            .await?;

        info!("MongoStore indexes ensured");
        Ok(())
    }

    fn upsert_options() -> UpdateOptions {
        UpdateOptions::builder().upsert(true).build()
    }

    fn fact_filter(group_id: &str, member_id: &str) -> Document {
        doc! { "group_id": group_id, "member_id": member_id }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl DurableStore for MongoStore {
    async fn upsert_cache_entry(
        &self,
        key: &str,
        type_tag: &str,
        payload: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let filter = doc! { "key": key, "type_tag": type_tag };
        let update = doc! {
            "$set": {
                "payload": payload,
                "expires_at": expires_at.map(|at| at.timestamp_millis()),
                "updated_at": now_millis(),
            }
        };

        self.cache_entries
            .update_one(filter, update)
            .with_options(Self::upsert_options())
            .await?;
        Ok(())
    }

    async fn get_cache_entries_by_type(&self, type_tag: &str) -> Result<Vec<StoredEntry>> {
        let mut cursor = self.cache_entries.find(doc! { "type_tag": type_tag }).await?;
        let mut entries = Vec::new();

        while let Some(result) = cursor.next().await {
            match result {
                Ok(doc) => entries.push(StoredEntry::from(doc)),
                Err(e) => warn!("Skipping unreadable {} cache row: {}", type_tag, e),
            }
        }

        debug!("Loaded {} '{}' cache rows", entries.len(), type_tag);
        Ok(entries)
    }

    async fn upsert_member_join(
        &self,
        group_id: &str,
        member_id: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<()> {
        let update = doc! {
            "$set": {
                "joined_at": joined_at.timestamp_millis(),
                "last_touched": now_millis(),
            }
        };

        self.member_joins
            .update_one(Self::fact_filter(group_id, member_id), update)
            .with_options(Self::upsert_options())
            .await?;
        Ok(())
    }

    async fn insert_member_join(
        &self,
        group_id: &str,
        member_id: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<bool> {
        let update = doc! {
            "$setOnInsert": { "joined_at": joined_at.timestamp_millis() },
            "$set": { "last_touched": now_millis() },
        };

        let result = self
            .member_joins
            .update_one(Self::fact_filter(group_id, member_id), update)
            .with_options(Self::upsert_options())
            .await?;
        Ok(result.upserted_id.is_some())
    }

    async fn get_member_join(
        &self,
        group_id: &str,
        member_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let result = self
            .member_joins
            .find_one(Self::fact_filter(group_id, member_id))
            .await?;
        Ok(result.map(|doc| doc.joined_at()))
    }

    async fn get_all_member_joins(&self, group_id: &str) -> Result<HashMap<String, DateTime<Utc>>> {
        let mut cursor = self.member_joins.find(doc! { "group_id": group_id }).await?;
        let mut joins = HashMap::new();

        while let Some(result) = cursor.next().await {
            let doc = result?;
            joins.insert(doc.member_id.clone(), doc.joined_at());
        }

        Ok(joins)
    }

    async fn touch_member_join(&self, group_id: &str, member_id: &str) -> Result<()> {
        self.member_joins
            .update_one(
                Self::fact_filter(group_id, member_id),
                doc! { "$set": { "last_touched": now_millis() } },
            )
            .await?;
        Ok(())
    }

    async fn upsert_member_roles(
        &self,
        group_id: &str,
        member_id: &str,
        role_ids: &[String],
        observed_at: DateTime<Utc>,
    ) -> Result<()> {
        let update = doc! {
            "$set": {
                "role_ids": role_ids.to_vec(),
                "observed_at": observed_at.timestamp_millis(),
                "last_touched": now_millis(),
            }
        };

        self.member_roles
            .update_one(Self::fact_filter(group_id, member_id), update)
            .with_options(Self::upsert_options())
            .await?;
        Ok(())
    }

    async fn get_member_roles(&self, group_id: &str, member_id: &str) -> Result<Vec<String>> {
        let result = self
            .member_roles
            .find_one(Self::fact_filter(group_id, member_id))
            .await?;
        Ok(result.map(|doc| doc.role_ids).unwrap_or_default())
    }

    async fn touch_member_roles(&self, group_id: &str, member_id: &str) -> Result<()> {
        self.member_roles
            .update_one(
                Self::fact_filter(group_id, member_id),
                doc! { "$set": { "last_touched": now_millis() } },
            )
            .await?;
        Ok(())
    }

    async fn cleanup_all_obsolete_data(&self) -> Result<CleanupSummary> {
        let now = Utc::now();
        let cutoff = retention_cutoff(now, self.retention).timestamp_millis();
        let stale = doc! { "last_touched": { "$lt": cutoff } };

        let cache_entries = self
            .cache_entries
            .delete_many(doc! { "expires_at": { "$lt": now.timestamp_millis() } })
            .await?
            .deleted_count;
        let member_joins = self.member_joins.delete_many(stale.clone()).await?.deleted_count;
        let member_roles = self.member_roles.delete_many(stale).await?.deleted_count;

        let summary = CleanupSummary {
            cache_entries,
            member_joins,
            member_roles,
        };
        info!(
            "Obsolete data cleanup: {} cache rows, {} join facts, {} role facts removed",
            summary.cache_entries, summary.member_joins, summary.member_roles
        );
        Ok(summary)
    }
}
