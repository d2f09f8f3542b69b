//! Startup warmup and on-demand backfill.
//!
//! Reloads persisted cache state, then walks groups fetching whatever the
//! cache is missing (group, roles, channels, members) and records durable
//! member facts along the way.

mod backfill;
mod config;
mod report;

pub use backfill::Backfill;
pub use config::WarmupConfig;
pub use report::{MemberPass, WarmupReport};
