use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

use crate::errors::{SearchError, SearchResult};
use crate::query::{Query, Regexp, Substring};

static PATTERN_CACHE: Lazy<DashMap<(String, bool), Arc<Regex>>> = Lazy::new(DashMap::new);

static SYMBOL_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?:pub(?:\([^)]*\))?|export|public|private|protected|static|async|unsafe|default)\s+)*(?:fn|struct|enum|trait|impl|type|const|static|mod|macro_rules!|class|def|func|interface|let|var)\b",
    )
    .expect("symbol definition regex is valid")
});

/// One file as seen by the matcher
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    pub repository: &'a str,
    /// Path relative to the repository root, `/` separated
    pub path: &'a str,
    pub content: &'a str,
}

/// Byte ranges that satisfied the query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hits {
    pub content: Vec<(usize, usize)>,
    pub file_name: Vec<(usize, usize)>,
}

impl Hits {
    fn extend(&mut self, other: Hits) {
        self.content.extend(other.content);
        self.file_name.extend(other.file_name);
    }

    fn is_empty(&self) -> bool {
        self.content.is_empty() && self.file_name.is_empty()
    }
}

/// Strategy for one atom, mirroring literal vs regex matching
enum MatchStrategy {
    Simple(String),
    Regex(Arc<Regex>),
}

impl MatchStrategy {
    fn find_all(&self, text: &str) -> Vec<(usize, usize)> {
        match self {
            MatchStrategy::Simple(pattern) => text
                .match_indices(pattern.as_str())
                .map(|(start, matched)| (start, start + matched.len()))
                .collect(),
            MatchStrategy::Regex(regex) => regex
                .find_iter(text)
                .filter(|m| !m.range().is_empty())
                .map(|m| (m.start(), m.end()))
                .collect(),
        }
    }
}

fn cached_regex(pattern: &str, case_sensitive: bool) -> SearchResult<Arc<Regex>> {
    let key = (pattern.to_string(), case_sensitive);
    if let Some(entry) = PATTERN_CACHE.get(&key) {
        return Ok(entry.clone());
    }
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .multi_line(true)
        .build()
        .map_err(|e| SearchError::backend(format!("bad regex {:?}: {}", pattern, e)))?;
    let regex = Arc::new(regex);
    PATTERN_CACHE.insert(key, regex.clone());
    Ok(regex)
}

fn substring_strategy(s: &Substring) -> SearchResult<MatchStrategy> {
    if s.case_sensitive {
        Ok(MatchStrategy::Simple(s.pattern.clone()))
    } else {
        Ok(MatchStrategy::Regex(cached_regex(&regex::escape(&s.pattern), false)?))
    }
}

fn atom_hits(
    strategy: MatchStrategy,
    file_name: bool,
    content: bool,
    doc: &Document<'_>,
) -> Hits {
    Hits {
        content: if content {
            strategy.find_all(doc.content)
        } else {
            Vec::new()
        },
        file_name: if file_name {
            strategy.find_all(doc.path)
        } else {
            Vec::new()
        },
    }
}

/// Evaluates `query` against `doc`.
///
/// Returns `None` when the document does not match, otherwise the ranges that
/// contributed to the match (possibly none, e.g. for a bare repository restriction).
pub fn evaluate(query: &Query, doc: &Document<'_>) -> SearchResult<Option<Hits>> {
    match query {
        Query::Const(true) => Ok(Some(Hits::default())),
        Query::Const(false) => Ok(None),
        Query::RepoSet(set) => Ok(set.contains(doc.repository).then(Hits::default)),
        Query::Substring(s) => {
            let hits = atom_hits(substring_strategy(s)?, s.file_name, s.content, doc);
            Ok((!hits.is_empty()).then_some(hits))
        }
        Query::Regexp(Regexp {
            pattern,
            case_sensitive,
            file_name,
            content,
        }) => {
            let strategy = MatchStrategy::Regex(cached_regex(pattern, *case_sensitive)?);
            let hits = atom_hits(strategy, *file_name, *content, doc);
            Ok((!hits.is_empty()).then_some(hits))
        }
        Query::Symbol(child) => {
            let Some(hits) = evaluate(child, doc)? else {
                return Ok(None);
            };
            let content: Vec<_> = hits
                .content
                .into_iter()
                .filter(|&(start, _)| is_in_definition(doc.content, start))
                .collect();
            Ok((!content.is_empty()).then(|| Hits {
                content,
                file_name: Vec::new(),
            }))
        }
        Query::And(children) => {
            let mut all = Hits::default();
            for child in children {
                match evaluate(child, doc)? {
                    Some(hits) => all.extend(hits),
                    None => return Ok(None),
                }
            }
            Ok(Some(all))
        }
        Query::Or(children) => {
            let mut any = None::<Hits>;
            for child in children {
                if let Some(hits) = evaluate(child, doc)? {
                    any.get_or_insert_with(Hits::default).extend(hits);
                }
            }
            Ok(any)
        }
        Query::Not(child) => Ok(match evaluate(child, doc)? {
            Some(_) => None,
            None => Some(Hits::default()),
        }),
    }
}

/// True when the line holding byte `offset` declares a symbol
fn is_in_definition(content: &str, offset: usize) -> bool {
    let line_start = content[..offset].rfind('\n').map_or(0, |n| n + 1);
    let line_end = content[offset..]
        .find('\n')
        .map_or(content.len(), |n| offset + n);
    SYMBOL_DEFINITION.is_match(&content[line_start..line_end])
}
