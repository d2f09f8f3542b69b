//! Access to the remote platform.
//!
//! - [`RemoteSession`] - network client for the platform API
//! - [`LiveState`] - in-memory state built from the gateway event stream
//! - [`CachedSession`] - read-through facade: cache, then live state, then API

mod cached;
mod remote;
mod state;

pub use cached::CachedSession;
pub use remote::{MAX_MEMBERS_PER_PAGE, RemoteSession};
pub use state::{LiveState, StateSnapshot};
