pub mod backend;
pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod errors;
pub mod filters;
pub mod local;
pub mod metrics;
pub mod query;
pub mod repos;
pub mod results;
pub mod trace;

pub use backend::{SearchOptions, Searcher};
pub use cache::{CacheEntry, ClientState, RepositorySetCache};
pub use client::{SearchArgs, SearchBackendClient};
pub use config::ClientConfig;
pub use context::{extend_deadline, DoneReason, ExtendedContext, SearchContext};
pub use errors::{SearchError, SearchResult};
pub use local::LocalSearcher;
pub use metrics::{ClientMetrics, ClientStats};
pub use query::{parse, PatternInfo, Query, RepoSet};
pub use repos::{RepoList, Repository, RepositoryRevisions, RepositorySet};
pub use results::{FileMatch, LineMatch, SearchResult as SearchOutput, Stats};
