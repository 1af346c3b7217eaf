use crate::store::GraphView;
use crate::{props, Direction, FeedError, NodeId, RelType, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// A post as returned to clients: its native properties flattened alongside
/// author identity, counts and, for a resolved viewer, relative flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedPost {
    #[serde(flatten)]
    pub properties: Map<String, Value>,
    pub username: Option<String>,
    pub name: Option<String>,
    pub hash: Option<String>,
    pub likes: u64,
    pub reposts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reposted: Option<bool>,
}

const ENRICHED_KEYS: [&str; 7] = [
    props::USERNAME,
    props::NAME,
    props::HASH,
    props::LIKES,
    props::REPOSTS,
    props::LIKED,
    props::REPOSTED,
];

/// Reposts are not counted by type: every incoming edge that is not the
/// author's Posted edge, a like or a reply is taken to be a repost.
pub fn derived_reposts(incoming: u64, likes: u64, replies: u64) -> u64 {
    incoming.saturating_sub(1 + likes + replies)
}

pub fn enrich_post(view: &dyn GraphView, post_id: NodeId, viewer: Option<NodeId>) -> Result<EnrichedPost> {
    let record = view.node(post_id)?.ok_or(FeedError::StaleIdentifier(post_id))?;
    let author_id = view
        .neighbors(post_id, RelType::Posted, Direction::Incoming)?
        .first()
        .copied()
        .ok_or(FeedError::OrphanedPost(post_id))?;
    let author = view.node(author_id)?.ok_or(FeedError::OrphanedPost(post_id))?;

    let likes = view.degree(post_id, Some(RelType::Likes), Direction::Incoming)?;
    let replies = view.degree(post_id, Some(RelType::RepliedTo), Direction::Incoming)?;
    let incoming = view.degree(post_id, None, Direction::Incoming)?;
    let reposts = derived_reposts(incoming, likes, replies);

    let explicit = view.degree(post_id, Some(RelType::Reposted), Direction::Incoming)?;
    if explicit != reposts {
        warn!(post_id, derived = reposts, explicit, "repost count disagrees with edge types; unknown incoming edge kind?");
    }

    let (liked, reposted) = match viewer {
        Some(user) => (
            Some(view.has_edge(user, post_id, RelType::Likes)?),
            Some(view.has_edge(user, post_id, RelType::Reposted)?),
        ),
        None => (None, None),
    };

    let mut properties = record.properties;
    for key in ENRICHED_KEYS {
        properties.remove(key);
    }
    Ok(EnrichedPost {
        properties,
        username: author.str_prop(props::USERNAME).map(str::to_string),
        name: author.str_prop(props::NAME).map(str::to_string),
        hash: author.str_prop(props::HASH).map(str::to_string),
        likes,
        reposts,
        liked,
        reposted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_reposts_subtracts_known_edges() {
        assert_eq!(derived_reposts(5, 2, 1), 1);
        assert_eq!(derived_reposts(1, 0, 0), 0);
        assert_eq!(derived_reposts(0, 0, 0), 0);
    }
}
