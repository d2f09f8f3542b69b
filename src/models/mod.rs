//! Entity records mirrored from the remote platform.
//!
//! These are plain serde structs; the cache stores them by value and the
//! durable store keeps them as JSON payloads.

pub mod channel;
pub mod group;
pub mod member;
pub mod role;

pub use channel::{Channel, ChannelKind};
pub use group::Group;
pub use member::{Member, member_key};
pub use role::{Role, RoleList};
