//! In-memory graph store.
//!
//! Writers mutate a private copy of the graph; every [`GraphView`] handed out
//! holds an `Arc` to the state as it was when the view was opened, so reads
//! within one request never observe concurrent writes.

use crate::index::{IndexGateway, InvertedIndex};
use crate::store::{GraphStore, GraphView};
use crate::{props, Direction, Edge, FeedError, Label, NodeId, NodeRecord, RelType, Result, Timestamp};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct GraphData {
    nodes: BTreeMap<NodeId, NodeRecord>,
    incoming: HashMap<NodeId, Vec<Edge>>,
    outgoing: HashMap<NodeId, Vec<Edge>>,
    users: HashMap<String, NodeId>,
    index: InvertedIndex,
    next_id: NodeId,
}

impl GraphData {
    fn edges(&self, id: NodeId, dir: Direction) -> &[Edge] {
        let map = match dir {
            Direction::Incoming => &self.incoming,
            Direction::Outgoing => &self.outgoing,
        };
        map.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn insert(&mut self, id: NodeId, record: NodeRecord) {
        if record.label == Label::User {
            if let Some(name) = record.str_prop(props::USERNAME) {
                self.users.insert(name.to_string(), id);
            }
        }
        if record.is_post() {
            if let Some(status) = record.str_prop(props::STATUS) {
                self.index.add_document(id, status);
            }
        }
        self.nodes.insert(id, record);
        self.next_id = self.next_id.max(id + 1);
    }
}

impl GraphView for GraphData {
    fn node(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        Ok(self.nodes.get(&id).cloned())
    }

    fn degree(&self, id: NodeId, rel: Option<RelType>, dir: Direction) -> Result<u64> {
        let edges = self.edges(id, dir);
        let n = match rel {
            Some(rel) => edges.iter().filter(|e| e.rel == rel).count(),
            None => edges.len(),
        };
        Ok(n as u64)
    }

    fn neighbors(&self, id: NodeId, rel: RelType, dir: Direction) -> Result<Vec<NodeId>> {
        Ok(self.edges(id, dir).iter().filter(|e| e.rel == rel).map(|e| e.other).collect())
    }

    fn has_edge(&self, from: NodeId, to: NodeId, rel: RelType) -> Result<bool> {
        Ok(self.edges(from, Direction::Outgoing).iter().any(|e| e.rel == rel && e.other == to))
    }

    fn highest_id_in_use(&self) -> Result<Option<NodeId>> {
        Ok(self.nodes.keys().next_back().copied())
    }

    fn resolve_user(&self, username: &str) -> Result<Option<NodeId>> {
        Ok(self.users.get(username).copied())
    }
}

/// Copy-on-write graph that also serves as its own term index.
pub struct MemoryGraph {
    data: RwLock<Arc<GraphData>>,
    index_online: RwLock<bool>,
}

impl Default for MemoryGraph {
    fn default() -> Self { Self::new() }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self { data: RwLock::new(Arc::new(GraphData::default())), index_online: RwLock::new(true) }
    }

    pub fn snapshot(&self) -> Arc<GraphData> { self.data.read().clone() }

    fn write<R>(&self, f: impl FnOnce(&mut GraphData) -> R) -> R {
        let mut guard = self.data.write();
        f(Arc::make_mut(&mut guard))
    }

    /// Insert a node under an explicit identifier, replacing whatever was there.
    pub fn put_node(&self, id: NodeId, record: NodeRecord) {
        self.write(|g| g.insert(id, record))
    }

    pub fn add_node(&self, record: NodeRecord) -> NodeId {
        self.write(|g| {
            let id = g.next_id;
            g.insert(id, record);
            id
        })
    }

    pub fn add_user(&self, username: &str, name: &str, hash: &str) -> NodeId {
        let mut p = Map::new();
        p.insert(props::USERNAME.into(), json!(username));
        p.insert(props::NAME.into(), json!(name));
        p.insert(props::HASH.into(), json!(hash));
        self.add_node(NodeRecord::new(Label::User, p))
    }

    /// Create a post and its Posted edge from `author`.
    pub fn add_post(&self, author: NodeId, status: &str, time: Timestamp) -> NodeId {
        let id = self.add_node(post_record(status, time));
        self.add_edge(author, id, RelType::Posted);
        id
    }

    pub fn add_edge(&self, from: NodeId, to: NodeId, rel: RelType) {
        self.write(|g| {
            g.outgoing.entry(from).or_default().push(Edge { rel, other: to });
            g.incoming.entry(to).or_default().push(Edge { rel, other: from });
        })
    }

    /// Delete a node and its edges. Postings are left in place, the way a
    /// lagging external index would still report the id.
    pub fn remove_node(&self, id: NodeId) {
        self.write(|g| {
            g.nodes.remove(&id);
            for dir in [Direction::Incoming, Direction::Outgoing] {
                let (own, other) = match dir {
                    Direction::Incoming => (&mut g.incoming, &mut g.outgoing),
                    Direction::Outgoing => (&mut g.outgoing, &mut g.incoming),
                };
                for edge in own.remove(&id).unwrap_or_default() {
                    if let Some(list) = other.get_mut(&edge.other) {
                        list.retain(|e| e.other != id);
                    }
                }
            }
            g.users.retain(|_, v| *v != id);
        })
    }

    pub fn set_index_online(&self, online: bool) { *self.index_online.write() = online; }
}

pub fn post_record(status: &str, time: Timestamp) -> NodeRecord {
    let mut p = Map::new();
    p.insert(props::STATUS.into(), Value::from(status));
    p.insert(props::TIME.into(), Value::from(time));
    NodeRecord::new(Label::Post, p)
}

impl GraphStore for MemoryGraph {
    fn view(&self) -> Arc<dyn GraphView> { self.snapshot() }
}

impl IndexGateway for MemoryGraph {
    fn match_term(&self, term: &str) -> Result<Vec<NodeId>> {
        if !*self.index_online.read() {
            return Err(FeedError::IndexUnavailable("in-memory index is offline".into()));
        }
        Ok(self.data.read().index.lookup(term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_are_snapshots() {
        let g = MemoryGraph::new();
        let alice = g.add_user("alice", "Alice", "h1");
        let before = g.view();
        let post = g.add_post(alice, "hello", 10);
        assert!(before.node(post).unwrap().is_none());
        assert_eq!(g.view().degree(post, Some(RelType::Posted), Direction::Incoming).unwrap(), 1);
    }

    #[test]
    fn removal_drops_edges_but_keeps_postings() {
        let g = MemoryGraph::new();
        let alice = g.add_user("alice", "Alice", "h1");
        let post = g.add_post(alice, "hello world", 10);
        g.remove_node(post);
        let v = g.view();
        assert!(v.node(post).unwrap().is_none());
        assert_eq!(v.degree(alice, None, Direction::Outgoing).unwrap(), 0);
        assert_eq!(g.match_term("hello").unwrap(), vec![post]);
    }
}
