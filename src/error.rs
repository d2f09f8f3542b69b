//! Error types shared across the mirror.
//!
//! Cache lookups never fail (a miss is just `None`). Errors only come out of
//! durable-store I/O, remote fetches and batch passes that aggregate them.

use std::time::Duration;

use thiserror::Error;

/// Result alias used by fallible mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Top-level error for the mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The durable store rejected or failed an operation.
    #[error("durable store error: {0}")]
    Store(String),

    /// A remote API call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A cache payload could not be encoded for persistence.
    #[error("failed to encode cache entry '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A persist pass finished with some entries not written.
    #[error("persist finished with {failed} of {total} entries failing")]
    Persist { failed: usize, total: usize },

    /// Invalid or missing configuration at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<mongodb::error::Error> for MirrorError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Store(err.to_string())
    }
}

/// Failure reported by the remote platform client.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("http error: {0}")]
    Http(String),

    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Shorthand for a not-found error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
