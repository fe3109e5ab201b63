use std::fmt;
use std::sync::Arc;
use tracing::{debug, Instrument};

use crate::backend::{SearchOptions, Searcher};
use crate::cache::{CacheEntry, ClientState, RepositorySetCache};
use crate::config::ClientConfig;
use crate::context::{extend_deadline, SearchContext};
use crate::errors::SearchResult;
use crate::metrics::ClientMetrics;
use crate::query::compose::{apply_file_presence_filters, compose, restrict_to};
use crate::query::{to_backend_query, PatternInfo, Query, RepoSet};
use crate::repos::{RepositoryRevisions, RepositorySet};
use crate::results::SearchResult as SearchOutput;
use crate::trace::Trace;

/// Arguments of one search
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub pattern: PatternInfo,
    /// Repositories the search may touch. Empty means search nothing.
    pub repos: Vec<RepositoryRevisions>,
    pub is_symbol: bool,
    /// Let the backend use all the time left until the caller's deadline
    pub use_full_deadline: bool,
    pub options: SearchOptions,
}

/// Caching, fault-tolerant client for a search backend.
///
/// The client starts a background task on first use of `list_all`; call
/// `close` when done with it. Clones share one cache.
#[derive(Clone)]
pub struct SearchBackendClient {
    searcher: Option<Arc<dyn Searcher>>,
    cache: RepositorySetCache,
    metrics: ClientMetrics,
}

impl SearchBackendClient {
    pub fn new(searcher: Option<Arc<dyn Searcher>>, config: ClientConfig) -> Self {
        let metrics = ClientMetrics::new();
        let cache = RepositorySetCache::new(searcher.clone(), config, metrics.clone());
        Self {
            searcher,
            cache,
            metrics,
        }
    }

    pub fn with_searcher(searcher: Arc<dyn Searcher>) -> Self {
        Self::new(Some(searcher), ClientConfig::default())
    }

    /// True if a backend exists and the client hasn't been disabled
    pub fn enabled(&self) -> bool {
        self.cache.enabled()
    }

    /// Disables the client when `enabled` is false. Does not undo `close`.
    pub fn set_enabled(&self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    /// Tears down the background refresher
    pub fn close(&self) {
        self.cache.close();
    }

    pub fn state(&self) -> ClientState {
        self.cache.state()
    }

    /// True while the background refresher task is alive
    pub fn refresher_active(&self) -> bool {
        self.cache.refresher_active()
    }

    fn closed(&self) -> bool {
        self.state() == ClientState::Stopped && !self.refresher_active()
    }

    pub fn cache_entry(&self) -> CacheEntry {
        self.cache.snapshot()
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    /// Every repository the backend knows about, without restrictions
    pub async fn list_all(&self, ctx: &SearchContext) -> SearchResult<RepositorySet> {
        self.cache.list_all(ctx).await
    }

    /// Searches the selected repositories.
    ///
    /// Returns an empty result without contacting the backend when nothing is
    /// selected, the client is disabled, or it has been closed and its refresher
    /// has exited.
    ///
    /// A `timeout:` filter in the pattern bounds `ctx` and lets the backend use all
    /// of it, as if `use_full_deadline` were set. A `count:` filter caps the number
    /// of file matches returned.
    pub async fn search(&self, ctx: &SearchContext, args: &SearchArgs) -> SearchResult<SearchOutput> {
        let searcher = match &self.searcher {
            Some(searcher) if !args.repos.is_empty() && self.enabled() && !self.closed() => {
                Arc::clone(searcher)
            }
            _ => {
                self.metrics.record_search_skipped();
                return Ok(SearchOutput::new());
            }
        };

        // Tell the backend which repos to search
        let repo_set = restrict_to(&args.repos);
        let query = to_backend_query(&args.pattern, args.is_symbol)?;
        let final_query = compose(repo_set.clone(), query.clone());

        let mut tr = Trace::new(
            "search_backend.search",
            format!("{} {}", repo_set.len(), final_query),
        );
        let span = tr.span().clone();
        let scoped = args.pattern.timeout.map(|timeout| ctx.with_timeout(timeout));
        let ctx = scoped.as_ref().unwrap_or(ctx);
        let result = self
            .search_traced(ctx, args, searcher.as_ref(), repo_set, query, &tr)
            .instrument(span)
            .await;

        match &result {
            Ok(output) if !output.files.is_empty() => {
                tr.lazy_printf(|| format!("{} file matches", output.files.len()));
            }
            Ok(_) => {}
            Err(err) => tr.set_error(err),
        }
        tr.finish();
        result
    }

    async fn search_traced(
        &self,
        ctx: &SearchContext,
        args: &SearchArgs,
        searcher: &dyn Searcher,
        repo_set: RepoSet,
        query: Query,
        tr: &Trace,
    ) -> SearchResult<SearchOutput> {
        let mut opts = args.options.clone();
        if let Some(count) = args.pattern.count {
            opts.max_doc_display_count = count;
        }

        let extended;
        let ctx = if args.use_full_deadline || args.pattern.timeout.is_some() {
            // The backend enforces the caller's deadline itself, so results found
            // before it are still returned rather than cut off by our context.
            if let Some(remaining) = ctx.remaining() {
                opts.max_wall_time = Some(remaining);
            }
            extended = extend_deadline(ctx);
            &*extended
        } else {
            ctx
        };

        let repo_set = if args.pattern.has_file_presence_filters() {
            let narrowed =
                apply_file_presence_filters(ctx, &args.pattern, searcher, repo_set).await?;
            tr.lazy_printf(|| {
                format!("after repohasfile filters: nRepos={}", narrowed.len())
            });
            narrowed
        } else {
            repo_set
        };

        if repo_set.is_empty() {
            debug!("no repositories left after repohasfile filters");
            self.metrics.record_search_skipped();
            return Ok(SearchOutput::new());
        }

        let final_query = compose(repo_set, query);
        tr.lazy_printf(|| format!("query={}", final_query));

        self.metrics.record_search();
        ctx.run(searcher.search(ctx, &final_query, &opts)).await
    }
}

impl fmt::Display for SearchBackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.searcher {
            Some(searcher) => write!(f, "search-backend({})", searcher),
            None => write!(f, "search-backend(<none>)"),
        }
    }
}

impl fmt::Debug for SearchBackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchBackendClient")
            .field("backend", &self.to_string())
            .field("cache", &self.cache)
            .finish()
    }
}
