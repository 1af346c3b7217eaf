use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod cache;
pub mod config;
pub mod enricher;
pub mod error;
pub mod feed;
pub mod index;
pub mod memory;
pub mod persist;
pub mod ranker;
pub mod store;
pub mod tokenizer;

pub use error::{FeedError, Result};

pub type NodeId = u64;
/// Epoch seconds.
pub type Timestamp = i64;

/// Property keys shared by the store, the indexer and the JSON responses.
pub mod props {
    pub const TIME: &str = "time";
    pub const STATUS: &str = "status";
    pub const USERNAME: &str = "username";
    pub const NAME: &str = "name";
    pub const HASH: &str = "hash";
    pub const LIKES: &str = "likes";
    pub const REPOSTS: &str = "reposts";
    pub const LIKED: &str = "liked";
    pub const REPOSTED: &str = "reposted";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Post,
    User,
}

/// The edge kinds a post can carry. Every incoming edge on a post is one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelType {
    Posted,
    Likes,
    Reposted,
    RepliedTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub label: Label,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl NodeRecord {
    pub fn new(label: Label, properties: Map<String, Value>) -> Self {
        Self { label, properties }
    }

    pub fn is_post(&self) -> bool { self.label == Label::Post }

    pub fn time(&self) -> Option<Timestamp> {
        self.properties.get(props::TIME).and_then(Value::as_i64)
    }

    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// One side of an adjacency list: the relationship type and the node at the other end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub rel: RelType,
    pub other: NodeId,
}
