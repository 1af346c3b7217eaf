//! Error types for the feed core.

use crate::NodeId;

/// Alias for Results returning [`FeedError`].
pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors surfaced by the read paths.
///
/// The type is `Clone` so that a single failed cache load can be handed to
/// every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("term index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("post {0} has no author edge")]
    OrphanedPost(NodeId),

    #[error("identifier {0} no longer resolves")]
    StaleIdentifier(NodeId),

    #[error("request timed out")]
    Timeout,

    #[error("store error: {0}")]
    Store(String),

    #[error("codec error: {0}")]
    Codec(String),
}

impl From<sled::Error> for FeedError {
    fn from(e: sled::Error) -> Self { FeedError::Store(e.to_string()) }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self { FeedError::Codec(e.to_string()) }
}

impl From<bincode::Error> for FeedError {
    fn from(e: bincode::Error) -> Self { FeedError::Codec(e.to_string()) }
}
