use postfeed_core::enricher::enrich_post;
use postfeed_core::memory::{post_record, MemoryGraph};
use postfeed_core::store::GraphStore;
use postfeed_core::{FeedError, RelType};
use serde_json::json;

#[test]
fn counts_likes_and_derives_reposts() {
    let g = MemoryGraph::new();
    let author = g.add_user("maxdemarzi", "Max De Marzi", "58750f2179edbd650b471280aa66fee5");
    let fan = g.add_user("fan", "Fan", "f");
    let other = g.add_user("other", "Other", "o");
    let post = g.add_post(author, "graph all the things", 1_490_140_299);
    let reply = g.add_post(other, "agreed", 1_490_140_300);

    g.add_edge(fan, post, RelType::Likes);
    g.add_edge(other, post, RelType::Likes);
    g.add_edge(reply, post, RelType::RepliedTo);
    g.add_edge(fan, post, RelType::Reposted);

    // 5 incoming: posted, 2 likes, 1 reply, 1 repost
    let enriched = enrich_post(g.view().as_ref(), post, Some(fan)).unwrap();
    assert_eq!(enriched.likes, 2);
    assert_eq!(enriched.reposts, 1);
    assert_eq!(enriched.username.as_deref(), Some("maxdemarzi"));
    assert_eq!(enriched.name.as_deref(), Some("Max De Marzi"));
    assert_eq!(enriched.hash.as_deref(), Some("58750f2179edbd650b471280aa66fee5"));
    assert_eq!(enriched.liked, Some(true));
    assert_eq!(enriched.reposted, Some(true));

    let for_author = enrich_post(g.view().as_ref(), post, Some(author)).unwrap();
    assert_eq!(for_author.liked, Some(false));
    assert_eq!(for_author.reposted, Some(false));
}

#[test]
fn serializes_flat_and_omits_viewer_fields_without_viewer() {
    let g = MemoryGraph::new();
    let author = g.add_user("jexp", "Michael", "h");
    let post = g.add_post(author, "hello", 42);

    let value = serde_json::to_value(enrich_post(g.view().as_ref(), post, None).unwrap()).unwrap();
    assert_eq!(
        value,
        json!({
            "status": "hello",
            "time": 42,
            "username": "jexp",
            "name": "Michael",
            "hash": "h",
            "likes": 0,
            "reposts": 0,
        })
    );
    assert!(value.get("liked").is_none());
    assert!(value.get("reposted").is_none());
}

#[test]
fn post_without_author_edge_is_orphaned() {
    let g = MemoryGraph::new();
    let post = g.add_node(post_record("nobody wrote this", 5));
    assert_eq!(enrich_post(g.view().as_ref(), post, None).unwrap_err(), FeedError::OrphanedPost(post));
}

#[test]
fn missing_post_is_stale() {
    let g = MemoryGraph::new();
    assert_eq!(enrich_post(g.view().as_ref(), 77, None).unwrap_err(), FeedError::StaleIdentifier(77));
}
