//! Test doubles shared by unit tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::RemoteError;
use crate::models::{Channel, Group, Member, Role};
use crate::session::{MAX_MEMBERS_PER_PAGE, RemoteSession};

/// A recorded remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Group(String),
    Roles(String),
    Channel(String),
    Channels(String),
    Members {
        group: String,
        after: Option<String>,
        limit: usize,
    },
    Member(String, String),
}

/// In-memory [`RemoteSession`] that records every call.
#[derive(Default)]
pub struct FakeRemote {
    groups: HashMap<String, Group>,
    roles: HashMap<String, Vec<Role>>,
    channels: HashMap<String, Vec<Channel>>,
    members: HashMap<String, Vec<Member>>,
    failing_groups: HashSet<String>,
    failing_members: HashSet<String>,
    calls: Mutex<Vec<Call>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.insert(group.id.clone(), group);
        self
    }

    pub fn with_roles(mut self, group_id: &str, roles: Vec<Role>) -> Self {
        self.roles.insert(group_id.to_string(), roles);
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channels
            .entry(channel.group_id.clone())
            .or_default()
            .push(channel);
        self
    }

    pub fn with_member(mut self, member: Member) -> Self {
        let list = self.members.entry(member.group_id.clone()).or_default();
        list.push(member);
        list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        self
    }

    /// Add `count` members `u00000..` to a group.
    pub fn with_members(mut self, group_id: &str, count: usize) -> Self {
        for i in 0..count {
            let mut member = Member::new(group_id, format!("u{i:05}"), format!("user{i}"));
            member.role_ids = vec!["r1".to_string()];
            self = self.with_member(member);
        }
        self
    }

    /// A complete group: record, one role, one channel, `members` members.
    pub fn with_full_group(self, group_id: &str, members: usize) -> Self {
        self.with_group(Group::new(group_id, format!("Group {group_id}"), "owner"))
            .with_roles(group_id, vec![Role::new(format!("{group_id}-r1"), "member")])
            .with_channel(Channel::new(format!("{group_id}-c1"), group_id, "general"))
            .with_members(group_id, members)
    }

    /// Every fetch for this group fails.
    pub fn failing_group(mut self, group_id: &str) -> Self {
        self.failing_groups.insert(group_id.to_string());
        self
    }

    /// Single-member fetches for this user fail.
    pub fn failing_member(mut self, user_id: &str) -> Self {
        self.failing_members.insert(user_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Recorded member page requests for a group.
    pub fn page_calls(&self, group_id: &str) -> Vec<(Option<String>, usize)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Members { group, after, limit } if group == group_id => {
                    Some((after.clone(), *limit))
                }
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn check_group(&self, group_id: &str) -> Result<(), RemoteError> {
        if self.failing_groups.contains(group_id) {
            return Err(RemoteError::Http(format!("500 for group {group_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for FakeRemote {
    async fn fetch_group(&self, group_id: &str) -> Result<Group, RemoteError> {
        self.record(Call::Group(group_id.to_string()));
        self.check_group(group_id)?;
        self.groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| RemoteError::not_found("group", group_id))
    }

    async fn fetch_roles(&self, group_id: &str) -> Result<Vec<Role>, RemoteError> {
        self.record(Call::Roles(group_id.to_string()));
        self.check_group(group_id)?;
        Ok(self.roles.get(group_id).cloned().unwrap_or_default())
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<Channel, RemoteError> {
        self.record(Call::Channel(channel_id.to_string()));
        self.channels
            .values()
            .flatten()
            .find(|c| c.id == channel_id)
            .cloned()
            .ok_or_else(|| RemoteError::not_found("channel", channel_id))
    }

    async fn fetch_channels(&self, group_id: &str) -> Result<Vec<Channel>, RemoteError> {
        self.record(Call::Channels(group_id.to_string()));
        self.check_group(group_id)?;
        Ok(self.channels.get(group_id).cloned().unwrap_or_default())
    }

    async fn fetch_members(
        &self,
        group_id: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Member>, RemoteError> {
        self.record(Call::Members {
            group: group_id.to_string(),
            after: after.map(str::to_string),
            limit,
        });
        self.check_group(group_id)?;

        let limit = limit.min(MAX_MEMBERS_PER_PAGE);
        Ok(self
            .members
            .get(group_id)
            .map(|list| {
                list.iter()
                    .filter(|m| after.is_none_or(|cursor| m.user_id.as_str() > cursor))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_member(&self, group_id: &str, user_id: &str) -> Result<Member, RemoteError> {
        self.record(Call::Member(group_id.to_string(), user_id.to_string()));
        self.check_group(group_id)?;
        if self.failing_members.contains(user_id) {
            return Err(RemoteError::Http(format!("500 for member {user_id}")));
        }
        self.members
            .get(group_id)
            .and_then(|list| list.iter().find(|m| m.user_id == user_id))
            .cloned()
            .ok_or_else(|| RemoteError::not_found("member", user_id))
    }
}
