//! sled-backed graph store and term postings.

use crate::index::{intersect, IndexGateway};
use crate::store::{GraphStore, GraphView};
use crate::tokenizer::terms;
use crate::{Direction, Edge, FeedError, NodeId, NodeRecord, RelType, Result};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const NODES: &str = "nodes";
const INCOMING: &str = "edges_in";
const OUTGOING: &str = "edges_out";
const USERS: &str = "users";
const POSTINGS: &str = "postings";

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_nodes: u64,
    pub num_posts: u64,
    pub created_at: String,
    pub version: u32,
}

pub struct GraphPaths {
    pub root: PathBuf,
}

impl GraphPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn db(&self) -> PathBuf { self.root.join("graph.sled") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

pub fn save_meta(paths: &GraphPaths, meta: &MetaFile) -> anyhow::Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &GraphPaths) -> anyhow::Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

fn id_key(id: NodeId) -> [u8; 8] { id.to_be_bytes() }

fn key_id(bytes: &[u8]) -> Result<NodeId> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| FeedError::Codec(format!("bad id key of {} bytes", bytes.len())))?;
    Ok(NodeId::from_be_bytes(arr))
}

/// Graph persisted in sled. Cloning shares the underlying database handle.
///
/// sled has no multi-key read snapshots, so a view sees each read as of the
/// moment it is made; concurrent deletions surface as unresolved ids.
#[derive(Clone)]
pub struct SledGraph {
    db: sled::Db,
    nodes: sled::Tree,
    incoming: sled::Tree,
    outgoing: sled::Tree,
    users: sled::Tree,
}

impl SledGraph {
    pub fn open(paths: &GraphPaths) -> Result<Self> {
        create_dir_all(&paths.root).map_err(|e| FeedError::Store(e.to_string()))?;
        let db = sled::open(paths.db())?;
        Ok(Self {
            nodes: db.open_tree(NODES)?,
            incoming: db.open_tree(INCOMING)?,
            outgoing: db.open_tree(OUTGOING)?,
            users: db.open_tree(USERS)?,
            db,
        })
    }

    pub fn put_node(&self, id: NodeId, record: &NodeRecord) -> Result<()> {
        self.nodes.insert(id_key(id), serde_json::to_vec(record)?)?;
        Ok(())
    }

    pub fn put_user_name(&self, username: &str, id: NodeId) -> Result<()> {
        self.users.insert(username.as_bytes(), id_key(id).to_vec())?;
        Ok(())
    }

    pub fn put_edge(&self, from: NodeId, to: NodeId, rel: RelType) -> Result<()> {
        push_edge(&self.outgoing, from, Edge { rel, other: to })?;
        push_edge(&self.incoming, to, Edge { rel, other: from })
    }

    /// Replace the posting list for `term`. Ids are stored sorted.
    pub fn put_postings(&self, term: &str, ids: &[NodeId]) -> Result<()> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let tree = self.db.open_tree(POSTINGS)?;
        tree.insert(term.as_bytes(), bincode::serialize(&ids)?)?;
        Ok(())
    }

    /// Empty every tree and drop the postings, leaving the store as if newly created.
    pub fn clear(&self) -> Result<()> {
        for tree in [&self.nodes, &self.incoming, &self.outgoing, &self.users] {
            tree.clear()?;
        }
        self.db.drop_tree(POSTINGS)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() && self.users.is_empty() }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn edges(&self, id: NodeId, dir: Direction) -> Result<Vec<Edge>> {
        let tree = match dir {
            Direction::Incoming => &self.incoming,
            Direction::Outgoing => &self.outgoing,
        };
        match tree.get(id_key(id))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn postings(&self) -> Result<sled::Tree> {
        let exists = self.db.tree_names().iter().any(|n| &n[..] == POSTINGS.as_bytes());
        if !exists {
            return Err(FeedError::IndexUnavailable(format!("no `{POSTINGS}` tree in store")));
        }
        Ok(self.db.open_tree(POSTINGS)?)
    }
}

fn push_edge(tree: &sled::Tree, id: NodeId, edge: Edge) -> Result<()> {
    let mut list: Vec<Edge> = match tree.get(id_key(id))? {
        Some(bytes) => bincode::deserialize(&bytes)?,
        None => Vec::new(),
    };
    list.push(edge);
    tree.insert(id_key(id), bincode::serialize(&list)?)?;
    Ok(())
}

impl GraphView for SledGraph {
    fn node(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        match self.nodes.get(id_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn degree(&self, id: NodeId, rel: Option<RelType>, dir: Direction) -> Result<u64> {
        let edges = self.edges(id, dir)?;
        let n = match rel {
            Some(rel) => edges.iter().filter(|e| e.rel == rel).count(),
            None => edges.len(),
        };
        Ok(n as u64)
    }

    fn neighbors(&self, id: NodeId, rel: RelType, dir: Direction) -> Result<Vec<NodeId>> {
        Ok(self.edges(id, dir)?.into_iter().filter(|e| e.rel == rel).map(|e| e.other).collect())
    }

    fn has_edge(&self, from: NodeId, to: NodeId, rel: RelType) -> Result<bool> {
        Ok(self.edges(from, Direction::Outgoing)?.iter().any(|e| e.rel == rel && e.other == to))
    }

    fn highest_id_in_use(&self) -> Result<Option<NodeId>> {
        match self.nodes.last()? {
            Some((k, _)) => Ok(Some(key_id(&k)?)),
            None => Ok(None),
        }
    }

    fn resolve_user(&self, username: &str) -> Result<Option<NodeId>> {
        match self.users.get(username.as_bytes())? {
            Some(bytes) => Ok(Some(key_id(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl GraphStore for SledGraph {
    fn view(&self) -> Arc<dyn GraphView> { Arc::new(self.clone()) }
}

impl IndexGateway for SledGraph {
    fn match_term(&self, term: &str) -> Result<Vec<NodeId>> {
        let tree = self.postings()?;
        let mut lists = Vec::new();
        for t in terms(term) {
            let list: Vec<NodeId> = match tree.get(t.as_bytes())? {
                Some(bytes) => bincode::deserialize(&bytes)?,
                None => Vec::new(),
            };
            lists.push(list);
        }
        Ok(intersect(lists))
    }
}
