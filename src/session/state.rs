//! Live state built from the gateway event stream.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::events::{ChangeEvent, EventHub, EventKind};
use crate::models::{Channel, Group, Member, Role};

/// Synchronous, network-free lookups into state observed from events.
pub trait LiveState: Send + Sync {
    fn member(&self, group_id: &str, user_id: &str) -> Option<Member>;

    fn group(&self, group_id: &str) -> Option<Group>;

    fn channel(&self, channel_id: &str) -> Option<Channel>;

    /// Role list of a group, if the full list has been observed.
    fn roles(&self, group_id: &str) -> Option<Vec<Role>>;

    /// IDs of every group currently known.
    fn group_ids(&self) -> Vec<String>;
}

/// Lock-free [`LiveState`] backed by `DashMap`s.
///
/// Cheap to clone; clones share the same maps.
#[derive(Clone, Default)]
pub struct StateSnapshot {
    members: Arc<DashMap<(String, String), Member>>,
    groups: Arc<DashMap<String, Group>>,
    roles: Arc<DashMap<String, Vec<Role>>>,
    channels: Arc<DashMap<String, Channel>>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_member(&self, member: Member) {
        self.members
            .insert((member.group_id.clone(), member.user_id.clone()), member);
    }

    pub fn insert_group(&self, group: Group) {
        self.groups.insert(group.id.clone(), group);
    }

    /// Replace the full role list of a group.
    pub fn insert_roles(&self, group_id: &str, roles: Vec<Role>) {
        self.roles.insert(group_id.to_string(), roles);
    }

    pub fn insert_channel(&self, channel: Channel) {
        self.channels.insert(channel.id.clone(), channel);
    }

    /// Fold one change event into the snapshot.
    pub fn apply(&self, event: &ChangeEvent) {
        trace!("StateSnapshot applying {:?}", event.kind());
        match event {
            ChangeEvent::MemberUpdated(member) => self.insert_member(member.clone()),
            ChangeEvent::MemberRemoved { group_id, user_id } => {
                self.members.remove(&(group_id.clone(), user_id.clone()));
            }
            ChangeEvent::GroupUpdated(group) => self.insert_group(group.clone()),
            ChangeEvent::RoleCreated { group_id, role } | ChangeEvent::RoleUpdated { group_id, role } => {
                // only patch lists we already hold in full
                if let Some(mut roles) = self.roles.get_mut(group_id) {
                    match roles.iter_mut().find(|r| r.id == role.id) {
                        Some(existing) => *existing = role.clone(),
                        None => roles.push(role.clone()),
                    }
                }
            }
            ChangeEvent::RoleDeleted { group_id, role_id } => {
                if let Some(mut roles) = self.roles.get_mut(group_id) {
                    roles.retain(|r| &r.id != role_id);
                }
            }
            ChangeEvent::ChannelUpdated(channel) => self.insert_channel(channel.clone()),
            ChangeEvent::ChannelDeleted { channel_id, .. } => {
                self.channels.remove(channel_id);
            }
        }
    }

    /// Subscribe to every event kind on `hub`.
    ///
    /// Attach before any cache invalidation handlers so that a read racing an
    /// invalidation never refills the cache from stale state.
    pub fn attach(&self, hub: &EventHub) {
        for kind in EventKind::ALL {
            let state = self.clone();
            hub.subscribe(kind, move |event| state.apply(event));
        }
    }
}

impl LiveState for StateSnapshot {
    fn member(&self, group_id: &str, user_id: &str) -> Option<Member> {
        self.members
            .get(&(group_id.to_string(), user_id.to_string()))
            .map(|m| m.clone())
    }

    fn group(&self, group_id: &str) -> Option<Group> {
        self.groups.get(group_id).map(|g| g.clone())
    }

    fn channel(&self, channel_id: &str) -> Option<Channel> {
        self.channels.get(channel_id).map(|c| c.clone())
    }

    fn roles(&self, group_id: &str) -> Option<Vec<Role>> {
        self.roles.get(group_id).map(|r| r.clone())
    }

    fn group_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.groups.iter().map(|g| g.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for StateSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSnapshot")
            .field("members", &self.members.len())
            .field("groups", &self.groups.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}
