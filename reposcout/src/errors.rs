/// This module defines the error type shared by every reposcout component.
///
/// # Two classes of failure
///
/// Errors fall into two groups that callers treat differently:
///
/// 1. **Backend call errors** (`Backend`, `Timeout`, `Canceled`, `DeadlineExceeded`, `Io`)
///    come from talking to the search engine. Synchronous callers see them verbatim; the
///    background refresher hides them until they persist.
///
/// 2. **Composition errors** (`QueryTranslation`, `InvalidFilter`) are raised while building
///    a query. They always abort a search before any network call and are never retried.
///
/// # Rust vs .NET Error Handling
///
/// .NET would model the cached failure as a stored exception object:
/// ```csharp
/// private Exception _lastError; // rethrown to every caller
/// ```
///
/// Rust stores a plain value. `SearchError` is `Clone`, so one failure published by the
/// refresher can be handed to any number of concurrent readers:
/// ```rust,ignore
/// match client.list_all(&ctx).await {
///     Ok(set) => // Use the snapshot,
///     Err(SearchError::Backend(msg)) => // Backend has been failing for a while,
///     Err(e) => // Handle other errors
/// }
/// ```
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur while listing or searching
#[derive(Error, Debug, Clone)]
pub enum SearchError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Context canceled")]
    Canceled,
    #[error("Context deadline exceeded")]
    DeadlineExceeded,
    #[error("Query translation error: {0}")]
    QueryTranslation(String),
    #[error("Invalid filter {filter}: {reason}")]
    InvalidFilter { filter: String, reason: String },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<config::ConfigError> for SearchError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl SearchError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn query_translation(msg: impl Into<String>) -> Self {
        Self::QueryTranslation(msg.into())
    }

    pub fn invalid_filter(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// True for errors raised while composing a query, before any backend call.
    pub fn is_composition_error(&self) -> bool {
        matches!(
            self,
            Self::QueryTranslation(_) | Self::InvalidFilter { .. }
        )
    }
}
