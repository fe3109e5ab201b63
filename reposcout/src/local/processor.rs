use std::borrow::Cow;
use std::path::Path;
use tracing::{trace, warn};

use super::matcher::{evaluate, Document, Hits};
use crate::errors::SearchResult;
use crate::query::Query;
use crate::results::{FileMatch, LineMatch};

/// Files larger than this are skipped
pub(crate) const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// Outcome of looking at one file
#[derive(Debug)]
pub(crate) enum Processed {
    Matched(FileMatch),
    NoMatch,
    Skipped,
}

/// Decodes bytes as UTF-8, replacing invalid sequences
fn decode_bytes(bytes: &[u8], path: &Path) -> String {
    let cow = String::from_utf8_lossy(bytes);
    if let Cow::Owned(_) = cow {
        warn!("Invalid UTF-8 replaced in file: {}", path.display());
    }
    cow.into_owned()
}

/// Reads a file and checks it against the query
#[derive(Debug, Clone, Copy)]
pub(crate) struct FileProcessor<'q> {
    query: &'q Query,
}

impl<'q> FileProcessor<'q> {
    pub fn new(query: &'q Query) -> Self {
        Self { query }
    }

    fn read(&self, path: &Path) -> Option<String> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Cannot stat {}: {}", path.display(), e);
                return None;
            }
        };
        if metadata.len() > LARGE_FILE_THRESHOLD {
            trace!("Skipping large file: {}", path.display());
            return None;
        }
        match std::fs::read(path) {
            Ok(bytes) => Some(decode_bytes(&bytes, path)),
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// True when the file satisfies the query, regardless of where the hits are
    pub fn matches(&self, repository: &str, rel_path: &str, path: &Path) -> SearchResult<bool> {
        let Some(content) = self.read(path) else {
            return Ok(false);
        };
        let doc = Document {
            repository,
            path: rel_path,
            content: &content,
        };
        Ok(evaluate(self.query, &doc)?.is_some())
    }

    pub fn process(&self, repository: &str, rel_path: &str, path: &Path) -> SearchResult<Processed> {
        let Some(content) = self.read(path) else {
            return Ok(Processed::Skipped);
        };
        let doc = Document {
            repository,
            path: rel_path,
            content: &content,
        };
        match evaluate(self.query, &doc)? {
            Some(hits) => Ok(Processed::Matched(FileMatch {
                repository: repository.to_string(),
                file_name: rel_path.to_string(),
                line_matches: line_matches(&doc, hits),
            })),
            None => Ok(Processed::NoMatch),
        }
    }
}

/// Groups hit ranges into per-line matches with line-relative fragments
fn line_matches(doc: &Document<'_>, mut hits: Hits) -> Vec<LineMatch> {
    let mut result = Vec::new();

    if !hits.file_name.is_empty() {
        hits.file_name.sort_unstable();
        hits.file_name.dedup();
        result.push(LineMatch {
            line_number: 0,
            line: doc.path.to_string(),
            fragments: hits.file_name,
            file_name: true,
        });
    }

    hits.content.sort_unstable();
    hits.content.dedup();

    let content = doc.content;
    let mut current_line = None;
    for (start, end) in hits.content {
        let line_start = content[..start].rfind('\n').map_or(0, |n| n + 1);
        let line_end = content[start..]
            .find('\n')
            .map_or(content.len(), |n| start + n);
        let fragment = (start - line_start, end.min(line_end) - line_start);

        if current_line == Some(line_start) {
            if let Some(last) = result.last_mut() {
                last.fragments.push(fragment);
                continue;
            }
        }
        current_line = Some(line_start);
        let line_number = 1 + content[..start].bytes().filter(|&b| b == b'\n').count();
        result.push(LineMatch {
            line_number,
            line: content[line_start..line_end].trim_end_matches('\r').to_string(),
            fragments: vec![fragment],
            file_name: false,
        });
    }
    result
}
