//! Read-side abstraction over the graph store.

use crate::{Direction, NodeId, NodeRecord, RelType, Result};
use std::sync::Arc;

/// A read-only view of the store, opened once per request.
///
/// Implementations are expected to answer every call on one view from a
/// consistent state; how strong that guarantee is depends on the backend.
pub trait GraphView: Send + Sync {
    /// Node record for `id`, or `None` if it was deleted or never existed.
    fn node(&self, id: NodeId) -> Result<Option<NodeRecord>>;

    /// Number of edges attached to `id` in `dir`, restricted to `rel` when given.
    fn degree(&self, id: NodeId, rel: Option<RelType>, dir: Direction) -> Result<u64>;

    fn neighbors(&self, id: NodeId, rel: RelType, dir: Direction) -> Result<Vec<NodeId>>;

    fn has_edge(&self, from: NodeId, to: NodeId, rel: RelType) -> Result<bool>;

    /// Highest identifier currently allocated, `None` for an empty store.
    fn highest_id_in_use(&self) -> Result<Option<NodeId>>;

    fn resolve_user(&self, username: &str) -> Result<Option<NodeId>>;
}

pub trait GraphStore: Send + Sync + 'static {
    fn view(&self) -> Arc<dyn GraphView>;
}
