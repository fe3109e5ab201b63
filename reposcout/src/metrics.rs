use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Tracks cache and search counters for one client
#[derive(Debug, Clone)]
pub struct ClientMetrics {
    // Refresher outcomes
    refresh_successes: Arc<AtomicU64>,
    refresh_failures: Arc<AtomicU64>,
    published_failures: Arc<AtomicU64>,
    suppressed_failures: Arc<AtomicU64>,

    // Cache metrics
    cache_hits: Arc<AtomicU64>,
    cache_misses: Arc<AtomicU64>,

    // Search metrics
    searches: Arc<AtomicU64>,
    searches_skipped: Arc<AtomicU64>,
}

impl ClientMetrics {
    /// Creates a new ClientMetrics instance
    pub fn new() -> Self {
        Self {
            refresh_successes: Arc::new(AtomicU64::new(0)),
            refresh_failures: Arc::new(AtomicU64::new(0)),
            published_failures: Arc::new(AtomicU64::new(0)),
            suppressed_failures: Arc::new(AtomicU64::new(0)),
            cache_hits: Arc::new(AtomicU64::new(0)),
            cache_misses: Arc::new(AtomicU64::new(0)),
            searches: Arc::new(AtomicU64::new(0)),
            searches_skipped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records the outcome of one refresh cycle
    pub fn record_refresh(&self, ok: bool, published: bool) {
        if ok {
            self.refresh_successes.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
        if published {
            self.published_failures.fetch_add(1, Ordering::Relaxed);
        } else {
            self.suppressed_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a list_all served from the cache (hit) or fetched uncached (miss)
    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a search that reached the backend
    pub fn record_search(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a search answered without contacting the backend
    pub fn record_search_skipped(&self) {
        self.searches_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets current statistics
    pub fn get_stats(&self) -> ClientStats {
        ClientStats {
            refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            published_failures: self.published_failures.load(Ordering::Relaxed),
            suppressed_failures: self.suppressed_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            searches_skipped: self.searches_skipped.load(Ordering::Relaxed),
        }
    }

    /// Logs current statistics
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Search client stats:\n\
             Refreshes ok/failed: {}/{}\n\
             Failures published/suppressed: {}/{}\n\
             Cache hits/misses: {}/{}\n\
             Searches issued/skipped: {}/{}",
            stats.refresh_successes,
            stats.refresh_failures,
            stats.published_failures,
            stats.suppressed_failures,
            stats.cache_hits,
            stats.cache_misses,
            stats.searches,
            stats.searches_skipped
        );
    }
}

impl Default for ClientMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the client counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub refresh_successes: u64,
    pub refresh_failures: u64,
    pub published_failures: u64,
    pub suppressed_failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub searches: u64,
    pub searches_skipped: u64,
}
