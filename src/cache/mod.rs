//! Cache module - TTL + LRU segments behind a unified per-entity facade.
//!
//! ## Architecture
//!
//! - `Segment<T>` - One bounded map with per-entry expiry and LRU eviction
//! - `UnifiedCache` - Four segments (members, groups, roles, channels),
//!   a background sweeper and optional durable persistence
//! - `Sweeper` - Periodic expired-entry cleanup on the tokio runtime
//!
//! ## Usage
//!
//! ```rust,ignore
//! let cache = UnifiedCache::new(CacheConfig::default());
//!
//! cache.set_member(&group_id, &user_id, member);
//! let member = cache.get_member(&group_id, &user_id);
//! ```

mod config;
mod persist;
mod segment;
mod sweeper;
mod unified;

pub use config::{CacheConfig, DEFAULT_SWEEP_INTERVAL, SegmentConfig};
pub use segment::{Segment, SegmentStats};
pub use sweeper::{Sweep, Sweeper, sweep_all};
pub use unified::{CacheStats, EntityKind, UnifiedCache};
