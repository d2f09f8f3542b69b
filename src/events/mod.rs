//! Remote change notifications.
//!
//! The gateway client turns platform events into [`ChangeEvent`]s and hands
//! them to an [`EventHub`]. Components that care (the cached session, the live
//! state snapshot) subscribe to the kinds they need; there is no global
//! dispatcher.

mod hub;

pub use hub::{EventHandler, EventHub};

use crate::models::{Channel, Group, Member, Role};

/// Kind of a [`ChangeEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MemberUpdated,
    MemberRemoved,
    GroupUpdated,
    RoleCreated,
    RoleUpdated,
    RoleDeleted,
    ChannelUpdated,
    ChannelDeleted,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 8] = [
        EventKind::MemberUpdated,
        EventKind::MemberRemoved,
        EventKind::GroupUpdated,
        EventKind::RoleCreated,
        EventKind::RoleUpdated,
        EventKind::RoleDeleted,
        EventKind::ChannelUpdated,
        EventKind::ChannelDeleted,
    ];
}

/// A change that happened on the remote platform.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    MemberUpdated(Member),
    MemberRemoved { group_id: String, user_id: String },
    GroupUpdated(Group),
    RoleCreated { group_id: String, role: Role },
    RoleUpdated { group_id: String, role: Role },
    RoleDeleted { group_id: String, role_id: String },
    ChannelUpdated(Channel),
    ChannelDeleted { group_id: String, channel_id: String },
}

impl ChangeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MemberUpdated(_) => EventKind::MemberUpdated,
            Self::MemberRemoved { .. } => EventKind::MemberRemoved,
            Self::GroupUpdated(_) => EventKind::GroupUpdated,
            Self::RoleCreated { .. } => EventKind::RoleCreated,
            Self::RoleUpdated { .. } => EventKind::RoleUpdated,
            Self::RoleDeleted { .. } => EventKind::RoleDeleted,
            Self::ChannelUpdated(_) => EventKind::ChannelUpdated,
            Self::ChannelDeleted { .. } => EventKind::ChannelDeleted,
        }
    }

    /// Group the event belongs to.
    pub fn group_id(&self) -> &str {
        match self {
            Self::MemberUpdated(member) => &member.group_id,
            Self::GroupUpdated(group) => &group.id,
            Self::ChannelUpdated(channel) => &channel.group_id,
            Self::MemberRemoved { group_id, .. }
            | Self::RoleCreated { group_id, .. }
            | Self::RoleUpdated { group_id, .. }
            | Self::RoleDeleted { group_id, .. }
            | Self::ChannelDeleted { group_id, .. } => group_id,
        }
    }
}
