//! The two public read paths: term search and latest posts.

use crate::cache::SearchCache;
use crate::config::FeedConfig;
use crate::enricher::{enrich_post, EnrichedPost};
use crate::ranker::{rank_candidates, LatestScan};
use crate::store::{GraphStore, GraphView};
use crate::{FeedError, NodeId, Result, Timestamp};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

const PAGE_PREALLOC: usize = 256;

/// Paging and viewer parameters shared by both read paths.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub limit: Option<usize>,
    /// Exclusive upper time bound; `None` means now.
    pub since: Option<Timestamp>,
    pub username: Option<String>,
}

/// Cancellation flag shared between a request and its blocking store work.
///
/// Store loops call [`Abort::check`] once per id they touch.
#[derive(Debug, Clone, Default)]
pub struct Abort(Arc<AtomicBool>);

impl Abort {
    pub fn trip(&self) { self.0.store(true, Ordering::Relaxed); }

    pub fn check(&self) -> Result<()> {
        if self.0.load(Ordering::Relaxed) { Err(FeedError::Timeout) } else { Ok(()) }
    }
}

#[derive(Clone)]
pub struct FeedAssembler {
    store: Arc<dyn GraphStore>,
    cache: SearchCache,
    config: FeedConfig,
}

impl FeedAssembler {
    pub fn new(store: Arc<dyn GraphStore>, cache: SearchCache, config: FeedConfig) -> Self {
        Self { store, cache, config }
    }

    pub fn cache(&self) -> &SearchCache { &self.cache }

    pub fn config(&self) -> &FeedConfig { &self.config }

    /// Newest posts matching `term`, older than the cursor, enriched in rank order.
    pub async fn search(&self, term: &str, req: &PageRequest) -> Result<Vec<EnrichedPost>> {
        let limit = self.config.clamp_limit(req.limit);
        let cursor = req.since.unwrap_or_else(now_epoch);
        let deadline = Instant::now() + self.config.request_timeout;
        let candidates = tokio::time::timeout_at(deadline, self.cache.get(term))
            .await
            .map_err(|_| FeedError::Timeout)??;
        let threshold = self.config.parallel_threshold;
        let username = req.username.clone();
        debug!(term, candidates = candidates.len(), limit, cursor, "search");
        self.run_blocking(deadline, move |view, abort| {
            let viewer = resolve_viewer(view, username.as_deref())?;
            let ranked = rank_candidates(view, &candidates, cursor, limit, threshold, abort)?;
            let mut page = Vec::with_capacity(ranked.len());
            for c in ranked {
                abort.check()?;
                if let Some(post) = enrich_or_skip(view, c.id, viewer)? {
                    page.push(post);
                }
            }
            Ok(page)
        })
        .await
    }

    /// Newest posts in the whole store, older than the cursor.
    pub async fn latest(&self, req: &PageRequest) -> Result<Vec<EnrichedPost>> {
        let limit = self.config.clamp_limit(req.limit);
        let cursor = req.since.unwrap_or_else(now_epoch);
        let username = req.username.clone();
        debug!(limit, cursor, "latest");
        let deadline = Instant::now() + self.config.request_timeout;
        self.run_blocking(deadline, move |view, abort| {
            let viewer = resolve_viewer(view, username.as_deref())?;
            let mut page = Vec::with_capacity(limit.min(PAGE_PREALLOC));
            if limit == 0 {
                return Ok(page);
            }
            for c in LatestScan::new(view, cursor)?.with_abort(abort.clone()) {
                if let Some(post) = enrich_or_skip(view, c?.id, viewer)? {
                    page.push(post);
                    if page.len() == limit {
                        break;
                    }
                }
            }
            Ok(page)
        })
        .await
    }

    /// Run store work for one request on the blocking pool against a single
    /// view. Past `deadline` the work is told to stop and nothing partial escapes.
    async fn run_blocking<T, F>(&self, deadline: Instant, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn GraphView, &Abort) -> Result<T> + Send + 'static,
    {
        let view = self.store.view();
        let abort = Abort::default();
        let flag = abort.clone();
        let task = tokio::task::spawn_blocking(move || work(view.as_ref(), &flag));
        match tokio::time::timeout_at(deadline, task).await {
            Ok(joined) => joined.map_err(|e| FeedError::Store(format!("feed task failed: {e}")))?,
            Err(_) => {
                abort.trip();
                warn!(timeout = ?self.config.request_timeout, "request timed out, discarding page");
                Err(FeedError::Timeout)
            }
        }
    }
}

fn now_epoch() -> Timestamp {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as Timestamp).unwrap_or(0)
}

/// An unknown username is not an error; the viewer fields are just omitted.
fn resolve_viewer(view: &dyn GraphView, username: Option<&str>) -> Result<Option<NodeId>> {
    let Some(name) = username else { return Ok(None) };
    let viewer = view.resolve_user(name)?;
    if viewer.is_none() {
        debug!(username = name, "unknown viewer");
    }
    Ok(viewer)
}

fn enrich_or_skip(view: &dyn GraphView, id: NodeId, viewer: Option<NodeId>) -> Result<Option<EnrichedPost>> {
    match enrich_post(view, id, viewer) {
        Ok(post) => Ok(Some(post)),
        Err(FeedError::StaleIdentifier(id)) => {
            trace!(id, "post vanished before enrichment");
            Ok(None)
        }
        Err(FeedError::OrphanedPost(id)) => {
            error!(post_id = id, "post has no author edge, skipping");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
