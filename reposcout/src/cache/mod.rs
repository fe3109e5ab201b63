mod refresher;

pub use refresher::{jittered_interval, should_publish};

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::Searcher;
use crate::config::ClientConfig;
use crate::context::SearchContext;
use crate::errors::{SearchError, SearchResult};
use crate::metrics::ClientMetrics;
use crate::query::Query;
use crate::repos::RepositorySet;

/// Lifecycle of the background refresher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No refresher running; the next cold `list_all` may start one
    Idle,
    /// Exactly one refresher is running
    Running,
    /// Closed for good; no refresher will ever start again
    Stopped,
}

/// What readers currently see
#[derive(Debug, Clone, Default)]
pub enum CacheEntry {
    /// Nothing published yet
    #[default]
    Empty,
    Ready(RepositorySet),
    /// The backend kept failing past the error threshold
    Failed(SearchError),
}

impl CacheEntry {
    pub fn is_empty(&self) -> bool {
        matches!(self, CacheEntry::Empty)
    }

    /// `None` while nothing has been published
    pub fn to_result(&self) -> Option<SearchResult<RepositorySet>> {
        match self {
            CacheEntry::Empty => None,
            CacheEntry::Ready(set) => Some(Ok(set.clone())),
            CacheEntry::Failed(err) => Some(Err(err.clone())),
        }
    }
}

impl From<SearchResult<RepositorySet>> for CacheEntry {
    fn from(result: SearchResult<RepositorySet>) -> Self {
        match result {
            Ok(set) => CacheEntry::Ready(set),
            Err(err) => CacheEntry::Failed(err),
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: ClientState,
    entry: CacheEntry,
    disabled: bool,
    /// True from `start` until the refresher task returns
    refresher_active: bool,
    task: Option<JoinHandle<()>>,
}

struct CacheInner {
    searcher: Option<Arc<dyn Searcher>>,
    config: ClientConfig,
    metrics: ClientMetrics,
    shared: RwLock<Shared>,
    /// Wakes a sleeping refresher when the cache is closed
    shutdown: watch::Sender<bool>,
}

/// In-memory snapshot of every repository the backend knows about, kept
/// approximately fresh by one background refresher.
///
/// The refresher is the only writer of the snapshot. Readers clone the current
/// entry under a read lock and never wait on the network. The lock is never
/// held across an await.
#[derive(Clone)]
pub struct RepositorySetCache {
    inner: Arc<CacheInner>,
}

impl RepositorySetCache {
    pub fn new(
        searcher: Option<Arc<dyn Searcher>>,
        config: ClientConfig,
        metrics: ClientMetrics,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(CacheInner {
                searcher,
                config,
                metrics,
                shared: RwLock::new(Shared {
                    state: ClientState::Idle,
                    entry: CacheEntry::Empty,
                    disabled: false,
                    refresher_active: false,
                    task: None,
                }),
                shutdown,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// True if a backend exists and it hasn't been disabled with `set_enabled`
    pub fn enabled(&self) -> bool {
        self.inner.enabled()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.shared.write().disabled = !enabled;
        debug!("repository cache enabled={}", enabled);
    }

    /// Stops the refresher for good. Safe to call more than once.
    pub fn close(&self) {
        let mut shared = self.inner.shared.write();
        if shared.state != ClientState::Stopped {
            info!("closing repository cache");
            shared.state = ClientState::Stopped;
        }
        drop(shared);
        self.inner.shutdown.send_replace(true);
    }

    pub fn state(&self) -> ClientState {
        self.inner.shared.read().state
    }

    /// True while a refresher task is alive, including one winding down after `close`
    pub fn refresher_active(&self) -> bool {
        self.inner.shared.read().refresher_active
    }

    /// The entry readers currently see
    pub fn snapshot(&self) -> CacheEntry {
        self.inner.shared.read().entry.clone()
    }

    /// Returns the cached repository set, falling back to one uncached fetch on a cold cache.
    ///
    /// A disabled cache answers with an empty set, so callers search nothing.
    pub async fn list_all(&self, ctx: &SearchContext) -> SearchResult<RepositorySet> {
        let (entry, serving) = {
            let shared = self.inner.shared.read();
            let stopped = shared.state == ClientState::Stopped && !shared.refresher_active;
            (shared.entry.clone(), !shared.disabled && !stopped)
        };
        if !serving || self.inner.searcher.is_none() {
            return Ok(RepositorySet::empty());
        }

        if let Some(result) = entry.to_result() {
            self.inner.metrics.record_cache_lookup(true);
            return result;
        }

        // No cached response: start the refresher and serve this caller uncached
        self.inner.metrics.record_cache_lookup(false);
        if !self.inner.config.disable_cache {
            self.start();
        }
        self.inner.list(ctx).await
    }

    /// Moves Idle to Running and spawns the refresher. Only one caller wins.
    fn start(&self) -> bool {
        let mut shared = self.inner.shared.write();
        if shared.state != ClientState::Idle {
            // already running or stopped
            return false;
        }
        shared.state = ClientState::Running;
        shared.refresher_active = true;

        let inner = Arc::clone(&self.inner);
        shared.task = Some(tokio::spawn(refresher::run(inner)));
        debug!("repository refresher spawned");
        true
    }
}

impl CacheInner {
    fn enabled(&self) -> bool {
        let disabled = self.shared.read().disabled;
        self.searcher.is_some() && !disabled
    }

    async fn list(&self, ctx: &SearchContext) -> SearchResult<RepositorySet> {
        let Some(searcher) = &self.searcher else {
            return Ok(RepositorySet::empty());
        };
        let resp = ctx
            .run(searcher.list(ctx, &Query::Const(true)))
            .await?;
        Ok(RepositorySet::from(resp))
    }
}

impl std::fmt::Debug for RepositorySetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.inner.shared.read();
        f.debug_struct("RepositorySetCache")
            .field("state", &shared.state)
            .field("entry", &shared.entry)
            .field("disabled", &shared.disabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::Repository;

    #[test]
    fn test_entry_to_result() {
        assert!(CacheEntry::Empty.to_result().is_none());

        let set: RepositorySet = vec![Repository::new("a")].into_iter().collect();
        let entry = CacheEntry::from(Ok(set.clone()));
        assert_eq!(entry.to_result().unwrap().unwrap(), set);

        let entry = CacheEntry::from(Err(SearchError::backend("down")));
        assert!(entry.to_result().unwrap().is_err());
    }

    #[tokio::test]
    async fn test_without_searcher_is_disabled() {
        let cache = RepositorySetCache::new(None, ClientConfig::default(), ClientMetrics::new());
        assert!(!cache.enabled());
        let set = cache.list_all(&SearchContext::background()).await.unwrap();
        assert!(set.is_empty());
        assert_eq!(cache.state(), ClientState::Idle);
    }

    #[test]
    fn test_close_is_idempotent() {
        let cache = RepositorySetCache::new(None, ClientConfig::default(), ClientMetrics::new());
        cache.close();
        cache.close();
        assert_eq!(cache.state(), ClientState::Stopped);
        assert!(!cache.start());
    }
}
