//! Cache configuration.

use std::time::Duration;

/// Sweep interval used when none (or zero) is configured.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Configuration for a single cache segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Maximum number of entries in the segment. `0` means unbounded.
    pub max_capacity: usize,

    /// Time-to-live for entries.
    /// `None` (or a zero duration) disables expiry.
    pub ttl: Option<Duration>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(300)), // 5 minutes
        }
    }
}

impl SegmentConfig {
    /// Create a new segment config with the given max capacity.
    pub fn with_capacity(max_capacity: usize) -> Self {
        Self {
            max_capacity,
            ..Default::default()
        }
    }

    /// Set max capacity (builder pattern).
    #[must_use]
    pub fn max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Set time-to-live for entries.
    #[must_use]
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.ttl = Some(duration);
        self
    }

    /// Disable TTL (entries never expire based on time).
    #[must_use]
    pub fn no_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Memberships: many entries, churn often.
    pub fn members() -> Self {
        Self {
            max_capacity: 50_000,
            ttl: Some(Duration::from_secs(1800)), // 30 minutes
        }
    }

    /// Groups: few entries, rarely change.
    pub fn groups() -> Self {
        Self {
            max_capacity: 1_000,
            ttl: Some(Duration::from_secs(3600)), // 1 hour
        }
    }

    /// Role lists: one per group, invalidated by events.
    pub fn roles() -> Self {
        Self {
            max_capacity: 1_000,
            ttl: Some(Duration::from_secs(3600)), // 1 hour
        }
    }

    /// Channels: tens per group.
    pub fn channels() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(3600)), // 1 hour
        }
    }
}

/// Configuration for the whole unified cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub members: SegmentConfig,
    pub groups: SegmentConfig,
    pub roles: SegmentConfig,
    pub channels: SegmentConfig,

    /// How often the background task drops expired entries.
    pub sweep_interval: Duration,

    /// Whether `persist`/`warmup` talk to the durable store.
    pub persistence: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            members: SegmentConfig::members(),
            groups: SegmentConfig::groups(),
            roles: SegmentConfig::roles(),
            channels: SegmentConfig::channels(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            persistence: false,
        }
    }
}

impl CacheConfig {
    /// Set the sweep interval (builder pattern).
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Enable or disable durable persistence.
    #[must_use]
    pub fn persistence(mut self, enabled: bool) -> Self {
        self.persistence = enabled;
        self
    }

    /// Sweep interval with the zero fallback applied.
    pub fn effective_sweep_interval(&self) -> Duration {
        if self.sweep_interval.is_zero() {
            DEFAULT_SWEEP_INTERVAL
        } else {
            self.sweep_interval
        }
    }
}
