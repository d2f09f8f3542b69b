//! Durable persistence of the unified cache.
//!
//! `persist` writes every entry of every segment as `{key, type_tag, json,
//! expires_at}`; `warmup` reads them back through the segment bulk-load path,
//! which keeps the stored expiry and skips capacity eviction.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use super::unified::{EntityKind, UnifiedCache};
use super::Segment;
use crate::database::DurableStore;
use crate::error::{MirrorError, Result};

/// Outcome of persisting one segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PassCount {
    total: usize,
    failed: usize,
}

impl UnifiedCache {
    /// Write every cached entry to the durable store.
    ///
    /// No-op unless persistence is enabled and a store is attached. Entries
    /// that fail to encode or write are counted and skipped; the pass always
    /// covers every segment and returns [`MirrorError::Persist`] if any failed.
    pub async fn persist(&self) -> Result<()> {
        let Some(store) = self.active_store() else {
            return Ok(());
        };

        let mut count = PassCount::default();
        for kind in EntityKind::ALL {
            let pass = match kind {
                EntityKind::Member => persist_segment(store, self.members(), kind).await,
                EntityKind::Group => persist_segment(store, self.groups(), kind).await,
                EntityKind::Roles => persist_segment(store, self.roles(), kind).await,
                EntityKind::Channel => persist_segment(store, self.channels(), kind).await,
            };
            count.total += pass.total;
            count.failed += pass.failed;
        }

        if count.failed > 0 {
            error!(
                "Cache persist: {} of {} entries failed",
                count.failed, count.total
            );
            return Err(MirrorError::Persist {
                failed: count.failed,
                total: count.total,
            });
        }

        info!("Cache persisted ({} entries)", count.total);
        Ok(())
    }

    /// Reload persisted entries into the segments.
    ///
    /// No-op unless persistence is enabled and a store is attached. Rows that
    /// fail to decode are skipped. Existing entries are never overwritten and
    /// capacity is not enforced, so a segment may exceed its limit until the
    /// next regular insert. Returns the number of entries loaded; a store read
    /// failure for any kind is reported after the remaining kinds are loaded.
    pub async fn warmup(&self) -> Result<usize> {
        let Some(store) = self.active_store() else {
            return Ok(0);
        };

        let mut loaded = 0;
        let mut first_error = None;

        for kind in EntityKind::ALL {
            let result = match kind {
                EntityKind::Member => load_segment(store, self.members(), kind).await,
                EntityKind::Group => load_segment(store, self.groups(), kind).await,
                EntityKind::Roles => load_segment(store, self.roles(), kind).await,
                EntityKind::Channel => load_segment(store, self.channels(), kind).await,
            };

            match result {
                Ok(n) => loaded += n,
                Err(e) => {
                    warn!("Cache warmup: reading '{}' rows failed: {}", kind.type_tag(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        info!("Cache warmup loaded {} entries from durable store", loaded);
        match first_error {
            Some(e) => Err(e),
            None => Ok(loaded),
        }
    }

    /// Stop the sweeper, then persist if enabled.
    pub async fn persist_and_stop(&self) -> Result<()> {
        self.stop();
        self.persist().await
    }

    fn active_store(&self) -> Option<&dyn DurableStore> {
        if !self.persistence {
            return None;
        }
        self.store.as_deref()
    }
}

async fn persist_segment<T>(store: &dyn DurableStore, segment: &Segment<T>, kind: EntityKind) -> PassCount
where
    T: Clone + Serialize,
{
    // snapshot under the read lock, then do I/O without holding it
    let entries = segment.snapshot();
    let tag = kind.type_tag();
    let mut count = PassCount {
        total: entries.len(),
        failed: 0,
    };

    for (key, value, expires_at) in entries {
        let payload = match serde_json::to_string(&value) {
            Ok(payload) => payload,
            Err(source) => {
                let err = MirrorError::Encode { key, source };
                warn!("{}", err);
                count.failed += 1;
                continue;
            }
        };

        if let Err(e) = store.upsert_cache_entry(&key, tag, &payload, expires_at).await {
            warn!("Failed to persist {} '{}': {}", tag, key, e);
            count.failed += 1;
        }
    }

    debug!("Persisted {} '{}' entries ({} failed)", count.total, tag, count.failed);
    count
}

async fn load_segment<T>(store: &dyn DurableStore, segment: &Segment<T>, kind: EntityKind) -> Result<usize>
where
    T: Clone + DeserializeOwned,
{
    let tag = kind.type_tag();
    let rows = store.get_cache_entries_by_type(tag).await?;
    let mut loaded = 0;

    for row in rows {
        match serde_json::from_str::<T>(&row.payload) {
            Ok(value) => {
                if segment.load_entry(&row.key, value, row.expires_at) {
                    loaded += 1;
                }
            }
            Err(e) => debug!("Skipping corrupt {} row '{}': {}", tag, row.key, e),
        }
    }

    debug!("Loaded {} '{}' entries", loaded, tag);
    Ok(loaded)
}
