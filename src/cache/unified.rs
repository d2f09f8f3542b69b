//! Unified cache over the four mirrored entity kinds.
//!
//! Each kind gets its own [`Segment`] (own lock, TTL and capacity), so traffic
//! on members never contends with traffic on channels. Persistence and the
//! reload path live in `persist.rs`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use super::sweeper::{Sweep, Sweeper, sweep_all};
use super::{CacheConfig, Segment, SegmentStats};
use crate::database::DurableStore;
use crate::models::{Channel, Group, Member, RoleList, member_key};

/// Entity kinds held by the unified cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Member,
    Group,
    Roles,
    Channel,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Member,
        EntityKind::Group,
        EntityKind::Roles,
        EntityKind::Channel,
    ];

    /// Tag stored alongside persisted rows.
    pub fn type_tag(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Group => "group",
            Self::Roles => "roles",
            Self::Channel => "channel",
        }
    }
}

/// Stats of all four segments.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub members: SegmentStats,
    pub groups: SegmentStats,
    pub roles: SegmentStats,
    pub channels: SegmentStats,
}

impl CacheStats {
    fn segments(&self) -> [&SegmentStats; 4] {
        [&self.members, &self.groups, &self.roles, &self.channels]
    }

    pub fn total_size(&self) -> usize {
        self.segments().iter().map(|s| s.size).sum()
    }

    pub fn total_hits(&self) -> u64 {
        self.segments().iter().map(|s| s.hits).sum()
    }

    pub fn total_misses(&self) -> u64 {
        self.segments().iter().map(|s| s.misses).sum()
    }

    pub fn total_evictions(&self) -> u64 {
        self.segments().iter().map(|s| s.evictions).sum()
    }

    /// Hit rate across every segment, 0 before the first access.
    pub fn overall_hit_rate(&self) -> f64 {
        let total = self.total_hits() + self.total_misses();
        if total == 0 {
            0.0
        } else {
            self.total_hits() as f64 / total as f64
        }
    }
}

/// In-process cache of members, groups, role lists and channels.
///
/// Owns a background sweep task for its whole life; call [`UnifiedCache::stop`]
/// (or [`UnifiedCache::persist_and_stop`]) on shutdown.
pub struct UnifiedCache {
    members: Arc<Segment<Member>>,
    groups: Arc<Segment<Group>>,
    roles: Arc<Segment<RoleList>>,
    channels: Arc<Segment<Channel>>,
    pub(super) store: Option<Arc<dyn DurableStore>>,
    pub(super) persistence: bool,
    sweeper: Sweeper,
}

impl UnifiedCache {
    /// Build a cache without durable storage.
    pub fn new(config: CacheConfig) -> Self {
        Self::build(config, None)
    }

    /// Build a cache that persists to (and reloads from) `store` when
    /// `config.persistence` is set.
    pub fn with_store(config: CacheConfig, store: Arc<dyn DurableStore>) -> Self {
        Self::build(config, Some(store))
    }

    fn build(config: CacheConfig, store: Option<Arc<dyn DurableStore>>) -> Self {
        let members = Arc::new(Segment::new("members", &config.members));
        let groups = Arc::new(Segment::new("groups", &config.groups));
        let roles = Arc::new(Segment::new("roles", &config.roles));
        let channels = Arc::new(Segment::new("channels", &config.channels));

        let targets: Vec<Arc<dyn Sweep>> = vec![
            members.clone() as Arc<dyn Sweep>,
            groups.clone() as Arc<dyn Sweep>,
            roles.clone() as Arc<dyn Sweep>,
            channels.clone() as Arc<dyn Sweep>,
        ];
        let sweeper = Sweeper::start(targets, config.effective_sweep_interval());

        info!(
            "Unified cache initialized (persistence: {}, store attached: {})",
            config.persistence,
            store.is_some()
        );

        Self {
            members,
            groups,
            roles,
            channels,
            store,
            persistence: config.persistence,
            sweeper,
        }
    }

    // --- members ---

    pub fn get_member(&self, group_id: &str, user_id: &str) -> Option<Member> {
        self.members.get(&composite_key(group_id, user_id))
    }

    pub fn set_member(&self, group_id: &str, user_id: &str, member: Member) {
        self.members.set(&composite_key(group_id, user_id), member);
    }

    pub fn invalidate_member(&self, group_id: &str, user_id: &str) {
        if self.members.invalidate(&composite_key(group_id, user_id)) {
            debug!("Invalidated member {} in group {}", user_id, group_id);
        }
    }

    // --- groups ---

    pub fn get_group(&self, group_id: &str) -> Option<Group> {
        self.groups.get(group_id)
    }

    pub fn set_group(&self, group_id: &str, group: Group) {
        self.groups.set(group_id, group);
    }

    pub fn invalidate_group(&self, group_id: &str) {
        if self.groups.invalidate(group_id) {
            debug!("Invalidated group {}", group_id);
        }
    }

    // --- role lists ---

    pub fn get_roles(&self, group_id: &str) -> Option<RoleList> {
        self.roles.get(group_id)
    }

    /// Replace the whole role list of a group.
    pub fn set_roles(&self, group_id: &str, roles: RoleList) {
        self.roles.set(group_id, roles);
    }

    pub fn invalidate_roles(&self, group_id: &str) {
        if self.roles.invalidate(group_id) {
            debug!("Invalidated role list of group {}", group_id);
        }
    }

    // --- channels ---

    pub fn get_channel(&self, channel_id: &str) -> Option<Channel> {
        self.channels.get(channel_id)
    }

    pub fn set_channel(&self, channel_id: &str, channel: Channel) {
        self.channels.set(channel_id, channel);
    }

    pub fn invalidate_channel(&self, channel_id: &str) {
        if self.channels.invalidate(channel_id) {
            debug!("Invalidated channel {}", channel_id);
        }
    }

    // --- segment access ---

    pub fn members(&self) -> &Segment<Member> {
        &self.members
    }

    pub fn groups(&self) -> &Segment<Group> {
        &self.groups
    }

    pub fn roles(&self) -> &Segment<RoleList> {
        &self.roles
    }

    pub fn channels(&self) -> &Segment<Channel> {
        &self.channels
    }

    /// Change the TTL of one segment (affects future writes).
    pub fn set_ttl(&self, kind: EntityKind, ttl: Option<Duration>) {
        match kind {
            EntityKind::Member => self.members.set_ttl(ttl),
            EntityKind::Group => self.groups.set_ttl(ttl),
            EntityKind::Roles => self.roles.set_ttl(ttl),
            EntityKind::Channel => self.channels.set_ttl(ttl),
        }
    }

    /// Change the capacity of one segment, evicting if it is now over it.
    pub fn set_limit(&self, kind: EntityKind, limit: usize) {
        match kind {
            EntityKind::Member => self.members.set_limit(limit),
            EntityKind::Group => self.groups.set_limit(limit),
            EntityKind::Roles => self.roles.set_limit(limit),
            EntityKind::Channel => self.channels.set_limit(limit),
        }
    }

    // --- housekeeping ---

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            members: self.members.stats(),
            groups: self.groups.stats(),
            roles: self.roles.stats(),
            channels: self.channels.stats(),
        }
    }

    /// Empty every segment. Durable storage is left alone.
    pub fn clear(&self) {
        self.members.clear();
        self.groups.clear();
        self.roles.clear();
        self.channels.clear();
        info!("Unified cache cleared");
    }

    /// Run one expiry sweep over all segments right now.
    pub fn cleanup_expired(&self) -> usize {
        let targets: [Arc<dyn Sweep>; 4] = [
            self.members.clone() as Arc<dyn Sweep>,
            self.groups.clone() as Arc<dyn Sweep>,
            self.roles.clone() as Arc<dyn Sweep>,
            self.channels.clone() as Arc<dyn Sweep>,
        ];
        sweep_all(&targets, Utc::now())
    }

    /// Stop the background sweep. Safe to call any number of times.
    pub fn stop(&self) {
        self.sweeper.stop();
    }

    /// Whether the background sweep task is alive.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.is_running()
    }

    /// Whether persist/warmup will touch the durable store.
    pub fn persistence_enabled(&self) -> bool {
        self.persistence && self.store.is_some()
    }
}

impl std::fmt::Debug for UnifiedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedCache")
            .field("members", &self.members.len())
            .field("groups", &self.groups.len())
            .field("roles", &self.roles.len())
            .field("channels", &self.channels.len())
            .field("persistence", &self.persistence_enabled())
            .finish()
    }
}

/// Membership key, or the empty (ignored) key if either part is missing.
fn composite_key(group_id: &str, user_id: &str) -> String {
    if group_id.is_empty() || user_id.is_empty() {
        return String::new();
    }
    member_key(group_id, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SegmentConfig;
    use crate::models::Role;

    fn small_config() -> CacheConfig {
        CacheConfig {
            members: SegmentConfig::with_capacity(2).ttl(Duration::from_secs(300)),
            groups: SegmentConfig::with_capacity(10),
            roles: SegmentConfig::with_capacity(10),
            channels: SegmentConfig::with_capacity(10),
            sweep_interval: Duration::from_millis(20),
            persistence: false,
        }
    }

    #[tokio::test]
    async fn test_member_roundtrip_and_invalidate() {
        let cache = UnifiedCache::new(small_config());
        let member = Member::new("g1", "u1", "alice");

        cache.set_member("g1", "u1", member.clone());
        assert_eq!(cache.get_member("g1", "u1"), Some(member));
        assert!(cache.members().contains("g1:u1"));

        cache.invalidate_member("g1", "u1");
        assert_eq!(cache.get_member("g1", "u1"), None);
        cache.stop();
    }

    #[tokio::test]
    async fn test_empty_key_parts_are_ignored() {
        let cache = UnifiedCache::new(small_config());
        cache.set_member("", "u1", Member::new("", "u1", "x"));
        cache.set_group("", Group::new("", "x", "o"));
        assert_eq!(cache.stats().total_size(), 0);
        assert_eq!(cache.get_member("g1", ""), None);
    }

    #[tokio::test]
    async fn test_segments_are_independent() {
        let cache = UnifiedCache::new(small_config());
        cache.set_group("g1", Group::new("g1", "Group", "owner"));
        cache.set_roles("g1", RoleList::new("g1", vec![Role::new("r1", "mod")]));
        cache.set_channel("c1", Channel::new("c1", "g1", "general"));

        cache.invalidate_group("g1");
        assert!(cache.get_group("g1").is_none());
        assert_eq!(cache.get_roles("g1").map(|r| r.len()), Some(1));
        assert!(cache.get_channel("c1").is_some());
    }

    #[tokio::test]
    async fn test_stats_aggregate() {
        let cache = UnifiedCache::new(small_config());
        cache.set_member("g1", "u1", Member::new("g1", "u1", "a"));
        cache.set_member("g1", "u2", Member::new("g1", "u2", "b"));
        cache.set_member("g1", "u3", Member::new("g1", "u3", "c"));
        cache.get_member("g1", "u3");
        cache.get_group("missing");

        let stats = cache.stats();
        assert_eq!(stats.members.size, 2);
        assert_eq!(stats.total_evictions(), 1);
        assert_eq!(stats.total_hits(), 1);
        assert_eq!(stats.total_misses(), 1);
        assert!((stats.overall_hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_set_limit_by_kind() {
        let cache = UnifiedCache::new(small_config());
        for id in ["c1", "c2", "c3"] {
            cache.set_channel(id, Channel::new(id, "g1", id));
        }
        cache.set_limit(EntityKind::Channel, 1);
        assert_eq!(cache.channels().len(), 1);
        assert!(cache.get_channel("c3").is_some());
    }

    #[tokio::test]
    async fn test_clear_empties_all() {
        let cache = UnifiedCache::new(small_config());
        cache.set_group("g1", Group::new("g1", "Group", "owner"));
        cache.set_channel("c1", Channel::new("c1", "g1", "general"));
        cache.clear();
        assert_eq!(cache.stats().total_size(), 0);
    }

    #[tokio::test]
    async fn test_background_sweep_removes_expired() {
        let cache = UnifiedCache::new(small_config());
        cache.members().set_with_expiration(
            "g1:u1",
            Member::new("g1", "u1", "a"),
            Some(Utc::now() - chrono::TimeDelta::seconds(1)),
        );
        assert_eq!(cache.members().len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.members().len(), 0);
        cache.stop();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let cache = Arc::new(UnifiedCache::new(small_config()));
        assert!(cache.is_sweeping());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.stop() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        cache.stop();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!cache.is_sweeping());
    }

    #[tokio::test]
    async fn test_manual_cleanup() {
        let cache = UnifiedCache::new(small_config().sweep_interval(Duration::from_secs(3600)));
        cache.groups().set_with_expiration(
            "g1",
            Group::new("g1", "Group", "owner"),
            Some(Utc::now() - chrono::TimeDelta::seconds(1)),
        );
        cache.set_group("g2", Group::new("g2", "Group", "owner"));
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.groups().len(), 1);
    }
}
