//! Durable storage.
//!
//! The cache only needs a narrow contract ([`DurableStore`]); MongoDB backs it
//! in production and [`MemoryStore`] stands in when no database is configured.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::Result;

mod memory_store;
mod models;
mod mongo;
mod mongo_store;
mod store;

pub use memory_store::MemoryStore;
pub use models::{CacheEntryDoc, MemberJoinDoc, MemberRolesDoc};
pub use mongo::Database;
pub use mongo_store::MongoStore;
pub use store::{CleanupSummary, DurableStore, StoredEntry, retention_cutoff};

/// Open the durable store: MongoDB when a URI is given, otherwise an
/// in-memory store that lives as long as the process.
pub async fn open_store(
    mongodb_uri: Option<&str>,
    database: &str,
    retention: Duration,
) -> Result<Arc<dyn DurableStore>> {
    let Some(uri) = mongodb_uri else {
        warn!("MONGODB_URI not set, using the in-memory store (nothing survives a restart)");
        return Ok(Arc::new(MemoryStore::new(retention)));
    };

    info!("Connecting to MongoDB...");
    let db = Database::connect(uri, database).await?;
    let store = MongoStore::new(&db, retention);
    store.ensure_indexes().await?;
    info!("Database connected");
    Ok(Arc::new(store))
}
