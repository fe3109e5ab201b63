//! The search engine capability the client wraps.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::context::SearchContext;
use crate::errors::SearchResult;
use crate::query::Query;
use crate::repos::RepoList;
use crate::results::SearchResult as SearchOutput;

/// Options forwarded to the backend with every search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Stop looking for more matches once this much time has passed.
    /// `None` leaves the choice to the backend.
    pub max_wall_time: Option<Duration>,
    /// Stop after this many file matches (0 means unlimited)
    pub max_doc_display_count: usize,
    /// Cap on matches collected per shard/repository (0 means unlimited)
    pub shard_max_match_count: usize,
    /// Cap on matches collected overall (0 means unlimited)
    pub total_max_match_count: usize,
}

/// An opaque full-text search engine.
///
/// Implementations must respect `ctx`: return once it is canceled.
#[async_trait]
pub trait Searcher: Send + Sync + fmt::Display {
    async fn search(
        &self,
        ctx: &SearchContext,
        query: &Query,
        opts: &SearchOptions,
    ) -> SearchResult<SearchOutput>;

    /// Lists repositories with at least one document matching `query`
    async fn list(&self, ctx: &SearchContext, query: &Query) -> SearchResult<RepoList>;
}
