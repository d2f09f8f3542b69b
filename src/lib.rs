//! Elysium mirror - caching layer for a remote chat platform.
//!
//! Keeps a local, bounded, expiring copy of groups, memberships, role lists
//! and channels, reads through to the remote API on a miss and drops entries
//! when change events arrive.
//!
//! ## Architecture
//!
//! - `cache` - TTL + LRU segments and the unified per-entity cache
//! - `config` - Environment configuration
//! - `database` - Durable store (MongoDB and in-memory)
//! - `events` - Change events and the subscription hub
//! - `models` - Entity records
//! - `session` - Remote API, live state and the cache-first session
//! - `warmup` - Startup reload and backfill

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod models;
pub mod session;
pub mod warmup;

#[cfg(test)]
mod testing;

pub use error::{MirrorError, RemoteError, Result};
