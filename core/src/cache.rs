//! Per-term memo of index lookups.
//!
//! Ready entries live in an LRU map. Loads in flight live beside it and are
//! never evicted. A load runs in a task owned by the cache and publishes its
//! outcome on a watch channel that every caller awaits, so a caller that
//! gives up neither cancels nor repeats it. Transitions happen under one
//! lock: exactly one load starts for a missing term and exactly one
//! background refresh runs for a stale one.

use crate::config::CachePolicy;
use crate::index::IndexGateway;
use crate::{FeedError, NodeId, Result};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Sorted, de-duplicated post ids matching one term.
pub type Candidates = Arc<[NodeId]>;

struct Loaded {
    ids: Candidates,
    at: Instant,
}

/// `None` until the load finishes.
type Published = Option<Result<Candidates>>;

struct Ready {
    ids: Candidates,
    loaded_at: Instant,
    refreshing: bool,
}

struct Flight {
    seq: u64,
    outcome: watch::Receiver<Published>,
}

struct Slots {
    ready: LruCache<String, Ready>,
    inflight: HashMap<String, Flight>,
    next_seq: u64,
}

enum Lookup {
    Hit(Candidates),
    Wait(watch::Receiver<Published>),
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    refreshes: AtomicU64,
    load_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub refreshes: u64,
    pub load_failures: u64,
}

struct Inner {
    gateway: Arc<dyn IndexGateway>,
    policy: CachePolicy,
    slots: Mutex<Slots>,
    counters: Counters,
}

/// Search-term cache with single-flight loads and stale-while-refresh.
///
/// Cloning yields another handle onto the same cache. Create one per process
/// and hand it to request handlers.
#[derive(Clone)]
pub struct SearchCache {
    inner: Arc<Inner>,
}

impl SearchCache {
    pub fn new(gateway: Arc<dyn IndexGateway>, policy: CachePolicy) -> Self {
        let capacity = NonZeroUsize::new(policy.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Inner {
                gateway,
                policy,
                slots: Mutex::new(Slots { ready: LruCache::new(capacity), inflight: HashMap::new(), next_seq: 0 }),
                counters: Counters::default(),
            }),
        }
    }

    /// Candidate ids for `term`.
    ///
    /// A fresh or stale entry is returned without waiting; a stale one also
    /// schedules a background refresh if none is running. A missing or
    /// expired entry waits on a single shared load. Dropping the returned
    /// future does not stop that load.
    pub async fn get(&self, term: &str) -> Result<Candidates> {
        let mut rx = match self.inner.lookup(term) {
            Lookup::Hit(ids) => return Ok(ids),
            Lookup::Wait(rx) => rx,
        };
        let published = rx.wait_for(Option::is_some).await.map_err(|_| abandoned(term))?;
        published.clone().unwrap_or_else(|| Err(abandoned(term)))
    }

    /// Drop every ready entry older than the expiry window. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expire = self.inner.policy.expire_after_write;
        let mut slots = self.inner.slots.lock();
        let expired: Vec<String> = slots
            .ready
            .iter()
            .filter(|(_, r)| now.saturating_duration_since(r.loaded_at) >= expire)
            .map(|(term, _)| term.clone())
            .collect();
        for term in &expired {
            slots.ready.pop(term);
        }
        expired.len()
    }

    /// Number of cached terms. Loads still in flight are not counted.
    pub fn len(&self) -> usize { self.inner.slots.lock().ready.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Forget every cached term. Loads in flight still finish and settle.
    pub fn clear(&self) { self.inner.slots.lock().ready.clear(); }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            entries: self.len(),
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            loads: c.loads.load(Ordering::Relaxed),
            refreshes: c.refreshes.load(Ordering::Relaxed),
            load_failures: c.load_failures.load(Ordering::Relaxed),
        }
    }
}

impl Inner {
    fn lookup(self: &Arc<Self>, term: &str) -> Lookup {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        if let Some(flight) = slots.inflight.get(term) {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Lookup::Wait(flight.outcome.clone());
        }
        if let Some(entry) = slots.ready.get_mut(term) {
            let age = now.saturating_duration_since(entry.loaded_at);
            if age < self.policy.expire_after_write {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                if age >= self.policy.refresh_after_write && !entry.refreshing {
                    entry.refreshing = true;
                    self.spawn_refresh(term.to_string());
                }
                return Lookup::Hit(entry.ids.clone());
            }
            debug!(term, ?age, "cache entry expired");
            slots.ready.pop(term);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        Lookup::Wait(self.start_load(&mut slots, term))
    }

    fn start_load(self: &Arc<Self>, slots: &mut Slots, term: &str) -> watch::Receiver<Published> {
        let seq = slots.next_seq;
        slots.next_seq += 1;
        let (tx, rx) = watch::channel(None);
        slots.inflight.insert(term.to_string(), Flight { seq, outcome: rx.clone() });
        self.counters.loads.fetch_add(1, Ordering::Relaxed);

        let inner = self.clone();
        let term = term.to_string();
        tokio::spawn(async move {
            let outcome = load(inner.gateway.clone(), term.clone()).await;
            if let Err(e) = &outcome {
                inner.counters.load_failures.fetch_add(1, Ordering::Relaxed);
                warn!(term, error = %e, "search load failed");
            }
            inner.settle(&term, seq, &outcome);
            // Nobody listening is fine; the entry is already settled.
            let _ = tx.send(Some(outcome.map(|loaded| loaded.ids)));
        });
        rx
    }

    /// Move a finished load out of the in-flight set. Failed loads leave no entry.
    fn settle(&self, term: &str, seq: u64, outcome: &Result<Loaded>) {
        let mut slots = self.slots.lock();
        if slots.inflight.get(term).map(|f| f.seq) != Some(seq) {
            return;
        }
        slots.inflight.remove(term);
        if let Ok(loaded) = outcome {
            debug!(term, hits = loaded.ids.len(), "search term cached");
            let ready = Ready { ids: loaded.ids.clone(), loaded_at: loaded.at, refreshing: false };
            if let Some((evicted, _)) = slots.ready.push(term.to_string(), ready) {
                if evicted != term {
                    trace!(term = %evicted, "evicted least recently used term");
                }
            }
        }
    }

    fn spawn_refresh(self: &Arc<Self>, term: String) {
        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
        let inner = self.clone();
        tokio::spawn(async move {
            let outcome = load(inner.gateway.clone(), term.clone()).await;
            let mut slots = inner.slots.lock();
            let Some(entry) = slots.ready.peek_mut(&term) else {
                return;
            };
            entry.refreshing = false;
            match outcome {
                Ok(loaded) => {
                    debug!(term, hits = loaded.ids.len(), "search term refreshed");
                    entry.ids = loaded.ids;
                    entry.loaded_at = loaded.at;
                }
                Err(e) => {
                    inner.counters.load_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(term, error = %e, "background refresh failed, keeping previous result");
                }
            }
        });
    }
}

fn abandoned(term: &str) -> FeedError {
    FeedError::Store(format!("load for `{term}` ended without a result"))
}

/// Run the index lookup on the blocking pool; the result is kept verbatim
/// apart from set normalization.
async fn load(gateway: Arc<dyn IndexGateway>, term: String) -> Result<Loaded> {
    let mut ids = tokio::task::spawn_blocking(move || gateway.match_term(&term))
        .await
        .map_err(|e| FeedError::Store(format!("index lookup task failed: {e}")))??;
    ids.sort_unstable();
    ids.dedup();
    Ok(Loaded { ids: ids.into(), at: Instant::now() })
}
