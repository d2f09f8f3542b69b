//! Elysium mirror service.
//!
//! Runs the unified cache against MongoDB, or an in-memory store when no URI
//! is configured: reloads persisted entries on start, persists periodically,
//! prunes obsolete durable data and persists once more on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use elysium_mirror::cache::UnifiedCache;
use elysium_mirror::config::Config;
use elysium_mirror::database::{DurableStore, open_store};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Obsolete durable data is pruned this often.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(6 * 3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("elysium_mirror=info,mongodb=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Elysium mirror...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");

    let store = open_store(
        config.mongodb_uri.as_deref(),
        &config.mongodb_database,
        config.fact_retention,
    )
    .await?;

    let cache = Arc::new(UnifiedCache::with_store(config.cache.clone(), store.clone()));

    if config.warmup_on_start {
        match cache.warmup().await {
            Ok(n) => info!("Restored {} cache entries", n),
            Err(e) => warn!("Cache reload incomplete: {}", e),
        }
    }

    let persist_task = spawn_persist_loop(cache.clone(), config.persist_interval);
    let cleanup_task = spawn_cleanup_loop(store, CLEANUP_INTERVAL);

    info!("Mirror running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    persist_task.abort();
    cleanup_task.abort();

    if let Err(e) = cache.persist_and_stop().await {
        error!("Final persist failed: {}", e);
    }

    let stats = cache.stats();
    info!(
        "Stopped ({} entries, hit rate {:.1}%)",
        stats.total_size(),
        stats.overall_hit_rate() * 100.0
    );
    Ok(())
}

fn spawn_persist_loop(cache: Arc<UnifiedCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = cache.persist().await {
                warn!("Periodic persist failed: {}", e);
            }
        }
    })
}

fn spawn_cleanup_loop(store: Arc<dyn DurableStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.cleanup_all_obsolete_data().await {
                Ok(summary) => info!(
                    "Cleanup removed {} rows ({} cache, {} joins, {} roles)",
                    summary.total(),
                    summary.cache_entries,
                    summary.member_joins,
                    summary.member_roles
                ),
                Err(e) => warn!("Cleanup failed: {}", e),
            }
        }
    })
}
