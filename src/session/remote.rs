//! Remote platform client contract.

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::models::{Channel, Group, Member, Role};

/// Most members the platform returns per page.
pub const MAX_MEMBERS_PER_PAGE: usize = 1000;

/// The slice of the platform API the mirror needs.
///
/// Rate limiting and retries are the implementation's concern; callers treat
/// every error as final for that request.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn fetch_group(&self, group_id: &str) -> Result<Group, RemoteError>;

    /// Full role list of a group.
    async fn fetch_roles(&self, group_id: &str) -> Result<Vec<Role>, RemoteError>;

    async fn fetch_channel(&self, channel_id: &str) -> Result<Channel, RemoteError>;

    /// Every channel of a group.
    async fn fetch_channels(&self, group_id: &str) -> Result<Vec<Channel>, RemoteError>;

    /// One page of members ordered by user ID, starting after `after`.
    ///
    /// `limit` is capped at [`MAX_MEMBERS_PER_PAGE`].
    async fn fetch_members(
        &self,
        group_id: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Member>, RemoteError>;

    async fn fetch_member(&self, group_id: &str, user_id: &str) -> Result<Member, RemoteError>;
}
