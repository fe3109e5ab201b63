/// This module implements the result types returned by the search backend.
///
/// # Ownership of results
///
/// A `SearchResult` owns its file matches outright. The client passes the backend's value
/// through unchanged; nothing keeps a second handle to it, so callers are free to move
/// pieces out of it:
/// ```rust,ignore
/// let result = client.search(&ctx, &args).await?;
/// for file in result.files {
///     // file is owned here, no clone needed
/// }
/// ```
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Represents a single matching line in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMatch {
    /// 1-based line number, or 0 for a match on the file name
    pub line_number: usize,
    /// The content of the line containing the match
    pub line: String,
    /// Byte ranges of the matches within the line
    pub fragments: Vec<(usize, usize)>,
    /// True when the match was on the file name rather than content
    #[serde(default)]
    pub file_name: bool,
}

/// Represents all matches found in a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMatch {
    pub repository: String,
    /// Path relative to the repository root
    pub file_name: String,
    pub line_matches: Vec<LineMatch>,
}

/// Counters reported by the backend for one search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub files_considered: usize,
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub match_count: usize,
    pub file_count: usize,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// The search stopped early because `max_wall_time` was spent
    pub wall_time_exceeded: bool,
}

/// Represents the complete search results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub files: Vec<FileMatch>,
    pub stats: Stats,
}

impl SearchResult {
    /// Creates a new empty search result
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a file match to the results
    pub fn add_file_match(&mut self, file_match: FileMatch) {
        if !file_match.line_matches.is_empty() {
            self.stats.match_count += file_match.line_matches.len();
            self.stats.file_count += 1;
            self.files.push(file_match);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
