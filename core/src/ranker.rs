//! Time-descending candidate ordering.
//!
//! Two modes share one ordering: newest first, equal timestamps broken by
//! the higher id first.
//!
//! * [`rank_candidates`] takes an unordered id set and keeps the best
//!   `limit` entries in a bounded min-heap, so memory stays proportional to
//!   `limit` rather than to the candidate count.
//! * [`LatestScan`] walks the id space downward and yields posts in the order
//!   met. It is a linear scan over every allocated id; a recency index would
//!   avoid it, but deletions leave gaps that this walk tolerates.

use crate::feed::Abort;
use crate::store::GraphView;
use crate::{NodeId, Result, Timestamp};
use rayon::prelude::*;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedCandidate {
    pub id: NodeId,
    pub time: Timestamp,
}

impl Ord for RankedCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time.cmp(&other.time).then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for RankedCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

/// Min-heap holding the `limit` greatest candidates seen so far.
struct TopK {
    heap: BinaryHeap<Reverse<RankedCandidate>>,
    limit: usize,
}

impl TopK {
    fn new(limit: usize) -> Self {
        Self { heap: BinaryHeap::with_capacity(limit.min(4096) + 1), limit }
    }

    fn push(&mut self, c: RankedCandidate) {
        if self.limit == 0 { return; }
        if self.heap.len() < self.limit {
            self.heap.push(Reverse(c));
        } else if let Some(Reverse(min)) = self.heap.peek() {
            if c > *min {
                self.heap.pop();
                self.heap.push(Reverse(c));
            }
        }
    }

    fn merge(mut self, other: TopK) -> TopK {
        for Reverse(c) in other.heap {
            self.push(c);
        }
        self
    }

    /// Newest first.
    fn into_sorted(self) -> Vec<RankedCandidate> {
        // Ascending by `Reverse` is descending by candidate.
        self.heap.into_sorted_vec().into_iter().map(|Reverse(c)| c).collect()
    }
}

/// Resolve one candidate to a ranked entry if it is a live post older than `cursor`.
fn resolve(view: &dyn GraphView, id: NodeId, cursor: Timestamp) -> Result<Option<RankedCandidate>> {
    let Some(node) = view.node(id)? else {
        trace!(id, "skipping stale candidate");
        return Ok(None);
    };
    if !node.is_post() {
        return Ok(None);
    }
    let Some(time) = node.time() else {
        debug!(id, "post without a time property");
        return Ok(None);
    };
    Ok((time < cursor).then_some(RankedCandidate { id, time }))
}

/// Bounded-set mode: the newest `limit` posts among `ids` strictly older than `cursor`.
///
/// Sets of at least `parallel_threshold` ids are resolved on the rayon pool
/// with one heap per chunk, merged at the end. Every id checks `abort`
/// first; a tripped flag ends the ranking with [`FeedError::Timeout`].
///
/// [`FeedError::Timeout`]: crate::FeedError::Timeout
pub fn rank_candidates(
    view: &dyn GraphView,
    ids: &[NodeId],
    cursor: Timestamp,
    limit: usize,
    parallel_threshold: usize,
    abort: &Abort,
) -> Result<Vec<RankedCandidate>> {
    if limit == 0 || ids.is_empty() {
        return Ok(Vec::new());
    }
    let top = if ids.len() >= parallel_threshold.max(1) {
        let chunk = (ids.len() / rayon::current_num_threads().max(1)).max(256);
        ids.par_chunks(chunk)
            .map(|chunk| -> Result<TopK> {
                let mut local = TopK::new(limit);
                for &id in chunk {
                    abort.check()?;
                    if let Some(c) = resolve(view, id, cursor)? {
                        local.push(c);
                    }
                }
                Ok(local)
            })
            .try_reduce(|| TopK::new(limit), |a, b| Ok(a.merge(b)))?
    } else {
        let mut top = TopK::new(limit);
        for &id in ids {
            abort.check()?;
            if let Some(c) = resolve(view, id, cursor)? {
                top.push(c);
            }
        }
        top
    };
    Ok(top.into_sorted())
}

/// Streaming mode: posts older than `cursor`, scanning ids from the highest
/// in use down to zero. Unresolved ids and non-posts are skipped.
pub struct LatestScan<'a> {
    view: &'a dyn GraphView,
    next: Option<NodeId>,
    cursor: Timestamp,
    abort: Abort,
}

impl<'a> LatestScan<'a> {
    pub fn new(view: &'a dyn GraphView, cursor: Timestamp) -> Result<Self> {
        let next = view.highest_id_in_use()?;
        Ok(Self { view, next, cursor, abort: Abort::default() })
    }

    /// Check `abort` before every id, skipped ones included. Once tripped the
    /// scan yields one [`FeedError::Timeout`](crate::FeedError::Timeout) and ends.
    pub fn with_abort(mut self, abort: Abort) -> Self {
        self.abort = abort;
        self
    }
}

impl Iterator for LatestScan<'_> {
    type Item = Result<RankedCandidate>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.next {
            if let Err(e) = self.abort.check() {
                self.next = None;
                return Some(Err(e));
            }
            self.next = id.checked_sub(1);
            match resolve(self.view, id, self.cursor) {
                Ok(Some(c)) => return Some(Ok(c)),
                Ok(None) => continue,
                Err(e) => {
                    self.next = None;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// The first `limit` posts of a [`LatestScan`].
pub fn latest_posts(view: &dyn GraphView, cursor: Timestamp, limit: usize) -> Result<Vec<RankedCandidate>> {
    LatestScan::new(view, cursor)?.take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(id: NodeId, time: Timestamp) -> RankedCandidate { RankedCandidate { id, time } }

    #[test]
    fn top_k_keeps_newest_with_id_tiebreak() {
        let mut top = TopK::new(3);
        for cand in [c(1, 10), c(2, 30), c(3, 20), c(4, 30), c(5, 5)] {
            top.push(cand);
        }
        assert_eq!(top.into_sorted(), vec![c(4, 30), c(2, 30), c(3, 20)]);
    }

    #[test]
    fn merged_heaps_stay_bounded() {
        let mut a = TopK::new(2);
        a.push(c(1, 1));
        a.push(c(2, 9));
        let mut b = TopK::new(2);
        b.push(c(3, 5));
        b.push(c(4, 7));
        assert_eq!(a.merge(b).into_sorted(), vec![c(2, 9), c(4, 7)]);
    }
}
