//! Per-task exploration state cache
//!
//! In-memory counters and per-search sub-states, materialized lazily from
//! the store on first reference and evicted after prolonged idleness.
//! Rehydration makes eviction safe: the store stays authoritative, the
//! cache only spares the status service repeated aggregate queries and
//! supplies the idle clock, which has no durable representation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use dredgestore::{SearchRow, Store, StoreError};

/// Point-in-time view of a task's exploration state
#[derive(Debug, Clone, Default)]
pub struct ExplorationSnapshot {
    pub total_pages: i64,
    pub total_fragments: i64,
    pub total_claims: i64,
    pub searches: Vec<SearchRow>,
    pub idle_seconds: u64,
}

struct TaskExploration {
    last_activity: Instant,
    total_pages: i64,
    total_fragments: i64,
    total_claims: i64,
    searches: BTreeMap<String, SearchRow>,
}

impl TaskExploration {
    fn snapshot(&self) -> ExplorationSnapshot {
        ExplorationSnapshot {
            total_pages: self.total_pages,
            total_fragments: self.total_fragments,
            total_claims: self.total_claims,
            searches: self.searches.values().cloned().collect(),
            idle_seconds: self.last_activity.elapsed().as_secs(),
        }
    }
}

type Entry = Arc<AsyncMutex<TaskExploration>>;

/// Lazily-materialized cache of per-task exploration state.
///
/// The outer map lock is never held across an await; per-task mutation is
/// serialized by the inner async mutex.
#[derive(Clone)]
pub struct ExplorationCache {
    store: Store,
    eviction: Duration,
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

impl ExplorationCache {
    pub fn new(store: Store, eviction: Duration) -> Self {
        Self {
            store,
            eviction,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn get(&self, task_id: &str) -> Option<Entry> {
        self.inner.lock().expect("exploration lock poisoned").get(task_id).cloned()
    }

    /// Fetch the entry for a task, rehydrating from the store when absent
    async fn entry(&self, task_id: &str) -> Result<Entry, StoreError> {
        if let Some(entry) = self.get(task_id) {
            return Ok(entry);
        }

        debug!(%task_id, "ExplorationCache: rehydrating");
        let searches = self.store.searches_for_task(task_id).await?;
        let total_pages = self.store.page_count(task_id).await?;
        let total_fragments = self.store.kept_fragment_count(task_id).await?;
        let total_claims = self.store.claim_count(task_id).await?;

        let hydrated = TaskExploration {
            last_activity: Instant::now(),
            total_pages,
            total_fragments,
            total_claims,
            searches: searches.into_iter().map(|s| (s.id.clone(), s)).collect(),
        };

        let mut inner = self.inner.lock().expect("exploration lock poisoned");
        // A concurrent hydration may have won the race; keep the first entry
        let entry = inner
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(hydrated)))
            .clone();
        Ok(entry)
    }

    /// Refresh a task's activity clock
    pub async fn record_activity(&self, task_id: &str) -> Result<(), StoreError> {
        let entry = self.entry(task_id).await?;
        entry.lock().await.last_activity = Instant::now();
        Ok(())
    }

    /// Seconds since the task last saw activity
    pub async fn idle_seconds(&self, task_id: &str) -> Result<u64, StoreError> {
        let entry = self.entry(task_id).await?;
        let idle = entry.lock().await.last_activity.elapsed().as_secs();
        Ok(idle)
    }

    /// Bump cumulative counters; refreshes the activity clock
    pub async fn record_progress(
        &self,
        task_id: &str,
        pages: i64,
        fragments: i64,
        claims: i64,
    ) -> Result<(), StoreError> {
        let entry = self.entry(task_id).await?;
        let mut state = entry.lock().await;
        state.total_pages += pages;
        state.total_fragments += fragments;
        state.total_claims += claims;
        state.last_activity = Instant::now();
        Ok(())
    }

    /// Upsert a search sub-state; refreshes the activity clock
    pub async fn update_search(&self, task_id: &str, search: SearchRow) -> Result<(), StoreError> {
        let entry = self.entry(task_id).await?;
        let mut state = entry.lock().await;
        state.searches.insert(search.id.clone(), search);
        state.last_activity = Instant::now();
        Ok(())
    }

    /// Snapshot the task's exploration state
    pub async fn snapshot(&self, task_id: &str) -> Result<ExplorationSnapshot, StoreError> {
        let entry = self.entry(task_id).await?;
        let snapshot = entry.lock().await.snapshot();
        Ok(snapshot)
    }

    /// Drop entries idle past the eviction threshold; returns how many were
    /// evicted. Evicted tasks rehydrate on next reference.
    pub async fn evict_idle(&self) -> usize {
        let candidates: Vec<(String, Entry)> = {
            let inner = self.inner.lock().expect("exploration lock poisoned");
            inner.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut stale = Vec::new();
        for (task_id, entry) in candidates {
            let idle = entry.lock().await.last_activity.elapsed();
            if idle >= self.eviction {
                stale.push(task_id);
            }
        }

        let mut inner = self.inner.lock().expect("exploration lock poisoned");
        let before = inner.len();
        for task_id in &stale {
            debug!(%task_id, "ExplorationCache: evicting idle entry");
            inner.remove(task_id);
        }
        before - inner.len()
    }

    /// Number of resident entries (tests and metrics)
    pub fn resident_count(&self) -> usize {
        self.inner.lock().expect("exploration lock poisoned").len()
    }

    /// Spawn a background task sweeping idle entries until shutdown fires
    pub fn start_evictor(
        &self,
        interval: Duration,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let evicted = cache.evict_idle().await;
                        if evicted > 0 {
                            debug!(evicted, "ExplorationCache: sweep complete");
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }
}
