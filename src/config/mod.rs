//! Configuration module for the Elysium mirror.
//!
//! Loads configuration from environment variables (and `.env`).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheConfig, SegmentConfig};
use crate::error::{MirrorError, Result};

const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(600);
const DEFAULT_FACT_RETENTION_DAYS: u64 = 30;
const SECS_PER_DAY: u64 = 86_400;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // MongoDB
    /// `None` runs on the in-memory store.
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,

    pub cache: CacheConfig,

    /// Reload persisted cache entries before serving.
    pub warmup_on_start: bool,

    /// How often the cache is written to the durable store.
    pub persist_interval: Duration,

    /// Member facts untouched for this long are dropped by cleanup.
    pub fact_retention: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mongodb_uri = lookup("MONGODB_URI").filter(|s| !s.trim().is_empty());

        let mongodb_database = lookup("MONGODB_DATABASE")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "elysium".to_string());

        let mut cache = CacheConfig {
            members: segment(&lookup, "MEMBER", SegmentConfig::members())?,
            groups: segment(&lookup, "GROUP", SegmentConfig::groups())?,
            roles: segment(&lookup, "ROLE", SegmentConfig::roles())?,
            channels: segment(&lookup, "CHANNEL", SegmentConfig::channels())?,
            ..CacheConfig::default()
        };
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CACHE_SWEEP_SECS")? {
            cache = cache.sweep_interval(Duration::from_secs(secs));
        }
        if let Some(enabled) = parse_bool(&lookup, "CACHE_PERSISTENCE")? {
            cache = cache.persistence(enabled);
        }

        let persist_interval = parse_var(&lookup, "PERSIST_INTERVAL_SECS")?
            .filter(|&secs: &u64| secs > 0)
            .map_or(DEFAULT_PERSIST_INTERVAL, Duration::from_secs);

        let retention_days = parse_var(&lookup, "FACT_RETENTION_DAYS")?
            .unwrap_or(DEFAULT_FACT_RETENTION_DAYS);

        Ok(Self {
            mongodb_uri,
            mongodb_database,
            cache,
            warmup_on_start: parse_bool(&lookup, "WARMUP_ON_START")?.unwrap_or(true),
            persist_interval,
            fact_retention: Duration::from_secs(retention_days.saturating_mul(SECS_PER_DAY)),
        })
    }
}

/// Apply `CACHE_{NAME}_TTL_SECS` (`0` disables expiry) and `CACHE_{NAME}_MAX`
/// (`0` is unbounded) on top of a preset.
fn segment<F>(lookup: &F, name: &str, preset: SegmentConfig) -> Result<SegmentConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = preset;
    match parse_var::<u64, _>(lookup, &format!("CACHE_{name}_TTL_SECS"))? {
        Some(0) => config = config.no_ttl(),
        Some(secs) => config = config.ttl(Duration::from_secs(secs)),
        None => {}
    }
    if let Some(max) = parse_var(lookup, &format!("CACHE_{name}_MAX"))? {
        config = config.max_capacity(max);
    }
    Ok(config)
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|e| MirrorError::Config(format!("{name}={raw:?}: {e}")))
}

fn parse_bool<F>(lookup: &F, name: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    match raw.trim().to_lowercase().as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => Err(MirrorError::Config(format!(
            "{name}={other:?} is not a boolean"
        ))),
    }
}
