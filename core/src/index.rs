use crate::tokenizer::terms;
use crate::{NodeId, Result};
use std::collections::{BTreeSet, HashMap};

/// External full-text index over post content.
pub trait IndexGateway: Send + Sync + 'static {
    /// Unordered identifiers of posts whose content matches `term`.
    /// Fails with `IndexUnavailable` when the index cannot be queried at all.
    fn match_term(&self, term: &str) -> Result<Vec<NodeId>>;
}

/// Term -> post id postings, kept in memory.
#[derive(Debug, Default, Clone)]
pub struct InvertedIndex {
    postings: HashMap<String, BTreeSet<NodeId>>,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn add_document(&mut self, id: NodeId, text: &str) {
        for term in terms(text) {
            self.postings.entry(term).or_default().insert(id);
        }
    }

    pub fn num_terms(&self) -> usize { self.postings.len() }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<NodeId>)> {
        self.postings.iter()
    }

    /// Posts containing every term of `query`.
    pub fn lookup(&self, query: &str) -> Vec<NodeId> {
        let lists = terms(query)
            .into_iter()
            .map(|t| self.postings.get(&t).map(|s| s.iter().copied().collect()).unwrap_or_default())
            .collect();
        intersect(lists)
    }
}

/// Intersection of sorted posting lists. No lists means no matches.
pub fn intersect(mut lists: Vec<Vec<NodeId>>) -> Vec<NodeId> {
    if lists.is_empty() { return Vec::new(); }
    lists.sort_by_key(|l| l.len());
    let mut acc = lists.swap_remove(0);
    for list in lists {
        if acc.is_empty() { break; }
        acc.retain(|id| list.binary_search(id).is_ok());
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_term_query_intersects() {
        let mut idx = InvertedIndex::new();
        idx.add_document(1, "graph databases are fun");
        idx.add_document(2, "graph theory");
        idx.add_document(3, "databases everywhere");
        assert_eq!(idx.lookup("graph database"), vec![1]);
        assert_eq!(idx.lookup("graphs"), vec![1, 2]);
        assert!(idx.lookup("").is_empty());
    }
}
