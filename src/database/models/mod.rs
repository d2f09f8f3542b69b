//! MongoDB document models.

pub mod cache_entry;
pub mod member_fact;

pub use cache_entry::CacheEntryDoc;
pub use member_fact::{MemberJoinDoc, MemberRolesDoc};
