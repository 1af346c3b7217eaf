use postfeed_core::memory::{post_record, MemoryGraph};
use postfeed_core::feed::Abort;
use postfeed_core::ranker::{latest_posts, rank_candidates, LatestScan, RankedCandidate};
use postfeed_core::store::GraphStore;
use postfeed_core::{Label, NodeRecord};
use serde_json::Map;

fn rc(id: u64, time: i64) -> RankedCandidate { RankedCandidate { id, time } }

#[test]
fn bounded_mode_orders_by_time_and_truncates() {
    let g = MemoryGraph::new();
    g.put_node(1, post_record("neo4j one", 100));
    g.put_node(2, post_record("neo4j two", 300));
    g.put_node(3, post_record("neo4j three", 200));
    let ranked = rank_candidates(g.view().as_ref(), &[1, 2, 3], 1000, 2, 4096, &Abort::default()).unwrap();
    assert_eq!(ranked, vec![rc(2, 300), rc(3, 200)]);
}

#[test]
fn bounded_mode_respects_exclusive_cursor_and_skips_tombstones() {
    let g = MemoryGraph::new();
    g.put_node(1, post_record("a", 100));
    g.put_node(2, post_record("b", 300));
    g.put_node(3, post_record("c", 200));
    g.remove_node(3);
    let ranked = rank_candidates(g.view().as_ref(), &[1, 2, 3, 99], 300, 10, 4096, &Abort::default()).unwrap();
    assert_eq!(ranked, vec![rc(1, 100)]);
}

#[test]
fn bounded_mode_zero_limit_is_empty() {
    let g = MemoryGraph::new();
    g.put_node(1, post_record("a", 100));
    assert!(rank_candidates(g.view().as_ref(), &[1], 1000, 0, 4096, &Abort::default()).unwrap().is_empty());
}

#[test]
fn parallel_and_sequential_rankings_agree() {
    let g = MemoryGraph::new();
    let ids: Vec<u64> = (0..5000).collect();
    for &id in &ids {
        // plenty of equal timestamps to exercise the id tie-break
        g.put_node(id, post_record("x", (id % 700) as i64));
    }
    let view = g.view();
    let seq = rank_candidates(view.as_ref(), &ids, 650, 40, usize::MAX, &Abort::default()).unwrap();
    let par = rank_candidates(view.as_ref(), &ids, 650, 40, 1, &Abort::default()).unwrap();
    assert_eq!(seq, par);
    assert_eq!(seq.len(), 40);
    assert!(seq.iter().all(|c| c.time < 650));
    assert!(seq.windows(2).all(|w| (w[0].time, w[0].id) > (w[1].time, w[1].id)));
    assert_eq!(seq[0], rc(4849, 649));
}

#[test]
fn streaming_scan_skips_gaps_non_posts_and_newer_posts() {
    let g = MemoryGraph::new();
    g.put_node(1, NodeRecord::new(Label::User, Map::new()));
    g.put_node(5, post_record("five", 30));
    g.put_node(7, NodeRecord::new(Label::User, Map::new()));
    g.put_node(8, post_record("eight", 40));
    g.put_node(10, post_record("ten", 50));
    let ranked = latest_posts(g.view().as_ref(), 45, 5).unwrap();
    assert_eq!(ranked, vec![rc(8, 40), rc(5, 30)]);
}

#[test]
fn streaming_scan_stops_at_limit_and_handles_empty_store() {
    let g = MemoryGraph::new();
    assert!(latest_posts(g.view().as_ref(), 100, 5).unwrap().is_empty());
    for t in 0..10 {
        g.add_node(post_record("p", t));
    }
    let view = g.view();
    let ranked = latest_posts(view.as_ref(), 100, 3).unwrap();
    assert_eq!(ranked, vec![rc(9, 9), rc(8, 8), rc(7, 7)]);
    // exhausting the id space down to zero is a normal end
    assert_eq!(LatestScan::new(view.as_ref(), 100).unwrap().count(), 10);
}
