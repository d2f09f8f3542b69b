//! Read-through session with event-driven invalidation.
//!
//! Lookup order for every entity: unified cache, then live state (no network),
//! then the remote API. Whatever the lower tiers return is written back into
//! the cache. Remote errors are returned as-is; retrying is the client's job.

use std::sync::{Arc, Weak};

use tracing::debug;

use super::{LiveState, RemoteSession};
use crate::cache::UnifiedCache;
use crate::error::RemoteError;
use crate::events::{ChangeEvent, EventHub, EventKind};
use crate::models::{Channel, Group, Member, RoleList};

/// Cache-first facade over a [`RemoteSession`].
pub struct CachedSession {
    remote: Arc<dyn RemoteSession>,
    state: Arc<dyn LiveState>,
    cache: Arc<UnifiedCache>,
}

impl CachedSession {
    pub fn new(
        remote: Arc<dyn RemoteSession>,
        state: Arc<dyn LiveState>,
        cache: Arc<UnifiedCache>,
    ) -> Self {
        Self {
            remote,
            state,
            cache,
        }
    }

    /// The cache this session fills.
    pub fn cache(&self) -> &Arc<UnifiedCache> {
        &self.cache
    }

    /// Get a membership.
    pub async fn get_member(&self, group_id: &str, user_id: &str) -> Result<Member, RemoteError> {
        if let Some(member) = self.cache.get_member(group_id, user_id) {
            return Ok(member);
        }

        if let Some(member) = self.state.member(group_id, user_id) {
            debug!("Member {} in {} served from live state", user_id, group_id);
            self.cache.set_member(group_id, user_id, member.clone());
            return Ok(member);
        }

        debug!("Member cache miss for {} in {}, fetching", user_id, group_id);
        let member = self.remote.fetch_member(group_id, user_id).await?;
        self.cache.set_member(group_id, user_id, member.clone());
        Ok(member)
    }

    /// Get a group.
    pub async fn get_group(&self, group_id: &str) -> Result<Group, RemoteError> {
        if let Some(group) = self.cache.get_group(group_id) {
            return Ok(group);
        }

        if let Some(group) = self.state.group(group_id) {
            debug!("Group {} served from live state", group_id);
            self.cache.set_group(group_id, group.clone());
            return Ok(group);
        }

        debug!("Group cache miss for {}, fetching", group_id);
        let group = self.remote.fetch_group(group_id).await?;
        self.cache.set_group(group_id, group.clone());
        Ok(group)
    }

    /// Get the full role list of a group.
    pub async fn get_roles(&self, group_id: &str) -> Result<RoleList, RemoteError> {
        if let Some(roles) = self.cache.get_roles(group_id) {
            return Ok(roles);
        }

        if let Some(roles) = self.state.roles(group_id) {
            debug!("Roles of {} served from live state", group_id);
            let list = RoleList::new(group_id, roles);
            self.cache.set_roles(group_id, list.clone());
            return Ok(list);
        }

        debug!("Role cache miss for {}, fetching", group_id);
        let list = RoleList::new(group_id, self.remote.fetch_roles(group_id).await?);
        self.cache.set_roles(group_id, list.clone());
        Ok(list)
    }

    /// Get a channel.
    pub async fn get_channel(&self, channel_id: &str) -> Result<Channel, RemoteError> {
        if let Some(channel) = self.cache.get_channel(channel_id) {
            return Ok(channel);
        }

        if let Some(channel) = self.state.channel(channel_id) {
            debug!("Channel {} served from live state", channel_id);
            self.cache.set_channel(channel_id, channel.clone());
            return Ok(channel);
        }

        debug!("Channel cache miss for {}, fetching", channel_id);
        let channel = self.remote.fetch_channel(channel_id).await?;
        self.cache.set_channel(channel_id, channel.clone());
        Ok(channel)
    }

    /// Drop whatever cache entry `event` makes stale.
    ///
    /// Any role change drops the group's whole role list, since the platform
    /// only serves full lists.
    pub fn handle_event(&self, event: &ChangeEvent) {
        debug!("Invalidating after {:?} in group {}", event.kind(), event.group_id());
        match event {
            ChangeEvent::MemberUpdated(member) => {
                self.cache.invalidate_member(&member.group_id, &member.user_id)
            }
            ChangeEvent::MemberRemoved { group_id, user_id } => {
                self.cache.invalidate_member(group_id, user_id)
            }
            ChangeEvent::GroupUpdated(group) => self.cache.invalidate_group(&group.id),
            ChangeEvent::RoleCreated { group_id, .. }
            | ChangeEvent::RoleUpdated { group_id, .. }
            | ChangeEvent::RoleDeleted { group_id, .. } => self.cache.invalidate_roles(group_id),
            ChangeEvent::ChannelUpdated(channel) => self.cache.invalidate_channel(&channel.id),
            ChangeEvent::ChannelDeleted { channel_id, .. } => {
                self.cache.invalidate_channel(channel_id)
            }
        }
    }

    /// Register invalidation handlers for every change kind on `hub`.
    ///
    /// Handlers hold a weak reference, so the hub never keeps the session alive.
    pub fn attach(self: &Arc<Self>, hub: &EventHub) {
        for kind in EventKind::ALL {
            let session: Weak<Self> = Arc::downgrade(self);
            hub.subscribe(kind, move |event| {
                if let Some(session) = session.upgrade() {
                    session.handle_event(event);
                }
            });
        }
        debug!("CachedSession attached to event hub");
    }
}

impl std::fmt::Debug for CachedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSession")
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::{CacheConfig, SegmentConfig};
    use crate::models::Role;
    use crate::session::StateSnapshot;
    use crate::testing::{Call, FakeRemote};

    fn setup(remote: FakeRemote) -> (Arc<CachedSession>, Arc<FakeRemote>, StateSnapshot) {
        let remote = Arc::new(remote);
        let state = StateSnapshot::new();
        let config = CacheConfig {
            members: SegmentConfig::default().ttl(Duration::from_secs(300)),
            ..CacheConfig::default()
        };
        let cache = Arc::new(UnifiedCache::new(config));
        let session = Arc::new(CachedSession::new(
            remote.clone(),
            Arc::new(state.clone()),
            cache,
        ));
        (session, remote, state)
    }

    #[tokio::test]
    async fn test_cache_hit_skips_other_tiers() {
        let (session, remote, state) = setup(FakeRemote::new());
        session
            .cache()
            .set_member("g1", "u1", Member::new("g1", "u1", "cached"));
        state.insert_member(Member::new("g1", "u1", "state"));

        let member = session.get_member("g1", "u1").await.unwrap();
        assert_eq!(member.username, "cached");
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_live_state_backfills_cache() {
        let (session, remote, state) = setup(FakeRemote::new());
        state.insert_group(Group::new("g1", "From state", "owner"));

        let group = session.get_group("g1").await.unwrap();
        assert_eq!(group.name, "From state");
        assert!(session.cache().get_group("g1").is_some());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remote_fallback_backfills_cache() {
        let remote = FakeRemote::new().with_member(Member::new("g1", "u1", "remote"));
        let (session, remote, _) = setup(remote);

        let member = session.get_member("g1", "u1").await.unwrap();
        assert_eq!(member.username, "remote");
        assert_eq!(remote.calls(), vec![Call::Member("g1".into(), "u1".into())]);

        // second read is served from cache
        session.get_member("g1", "u1").await.unwrap();
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_error_propagates() {
        let (session, _, _) = setup(FakeRemote::new());
        let err = session.get_channel("c404").await.unwrap_err();
        assert!(matches!(err, RemoteError::NotFound { kind: "channel", .. }));
        assert!(session.cache().get_channel("c404").is_none());
    }

    #[tokio::test]
    async fn test_roles_fetched_as_full_list() {
        let remote = FakeRemote::new().with_roles("g1", vec![Role::new("r1", "a"), Role::new("r2", "b")]);
        let (session, _, _) = setup(remote);

        let roles = session.get_roles("g1").await.unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(session.cache().get_roles("g1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_member_update_event_invalidates() {
        let (session, _, _) = setup(FakeRemote::new());
        let hub = EventHub::new();
        session.attach(&hub);

        let cache = session.cache();
        cache.set_member("g1", "u1", Member::new("g1", "u1", "alice"));
        assert!(cache.get_member("g1", "u1").is_some());

        hub.dispatch(&ChangeEvent::MemberUpdated(Member::new("g1", "u1", "alice2")));
        assert!(cache.get_member("g1", "u1").is_none());
    }

    #[tokio::test]
    async fn test_any_role_event_drops_whole_list() {
        let (session, _, _) = setup(FakeRemote::new());
        let hub = EventHub::new();
        session.attach(&hub);
        let cache = session.cache();

        for event in [
            ChangeEvent::RoleCreated {
                group_id: "g1".into(),
                role: Role::new("r9", "new"),
            },
            ChangeEvent::RoleUpdated {
                group_id: "g1".into(),
                role: Role::new("r1", "renamed"),
            },
            ChangeEvent::RoleDeleted {
                group_id: "g1".into(),
                role_id: "r2".into(),
            },
        ] {
            cache.set_roles("g1", RoleList::new("g1", vec![Role::new("r1", "a"), Role::new("r2", "b")]));
            cache.set_roles("g2", RoleList::new("g2", vec![Role::new("r3", "c")]));
            hub.dispatch(&event);
            assert!(cache.get_roles("g1").is_none());
            assert!(cache.get_roles("g2").is_some());
        }
    }

    #[tokio::test]
    async fn test_group_and_channel_events_invalidate_single_key() {
        let (session, _, _) = setup(FakeRemote::new());
        let cache = session.cache();
        cache.set_group("g1", Group::new("g1", "A", "o"));
        cache.set_channel("c1", Channel::new("c1", "g1", "general"));
        cache.set_channel("c2", Channel::new("c2", "g1", "random"));

        session.handle_event(&ChangeEvent::GroupUpdated(Group::new("g1", "B", "o")));
        session.handle_event(&ChangeEvent::ChannelDeleted {
            group_id: "g1".into(),
            channel_id: "c1".into(),
        });

        assert!(cache.get_group("g1").is_none());
        assert!(cache.get_channel("c1").is_none());
        assert!(cache.get_channel("c2").is_some());
    }

    #[tokio::test]
    async fn test_dropped_session_handlers_are_inert() {
        let (session, _, _) = setup(FakeRemote::new());
        let hub = EventHub::new();
        session.attach(&hub);
        let cache = Arc::clone(session.cache());
        drop(session);

        cache.set_group("g1", Group::new("g1", "A", "o"));
        hub.dispatch(&ChangeEvent::GroupUpdated(Group::new("g1", "B", "o")));
        assert!(cache.get_group("g1").is_some());
    }
}
