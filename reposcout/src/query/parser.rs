//! Parses the caller's query string into a `PatternInfo`.
//!
//! The syntax is a whitespace separated list of terms. A term of the form
//! `field:value` (optionally `-field:value`) is a filter; everything else,
//! including `"quoted strings"`, is part of the search pattern.

use std::time::Duration;

use crate::errors::{SearchError, SearchResult};

/// What a query asks the backend to match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultType {
    #[default]
    Code,
    Symbol,
    Path,
    Diff,
    Commit,
}

/// The caller's query, before translation into the backend's query tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternInfo {
    pub pattern: String,
    pub is_regexp: bool,
    pub is_case_sensitive: bool,
    /// `file:` filters, all of which must match the path
    pub include_patterns: Vec<String>,
    /// `-file:` filters joined into one alternation
    pub exclude_pattern: Option<String>,
    pub file_patterns_repos_must_include: Vec<String>,
    pub file_patterns_repos_must_exclude: Vec<String>,
    pub pattern_matches_content: bool,
    pub pattern_matches_path: bool,
    pub result_type: ResultType,

    // Resolved upstream, never sent to the backend
    pub repo_filters: Vec<String>,
    pub repo_exclude_filters: Vec<String>,
    pub repo_group: Option<String>,

    // Accepted by the parser, rejected by the translator
    pub languages: Vec<String>,
    pub excluded_languages: Vec<String>,
    pub commit_after: Option<String>,
    pub fork: Option<String>,
    pub archived: Option<String>,

    pub count: Option<usize>,
    pub timeout: Option<Duration>,
}

impl Default for PatternInfo {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            is_regexp: false,
            is_case_sensitive: false,
            include_patterns: Vec::new(),
            exclude_pattern: None,
            file_patterns_repos_must_include: Vec::new(),
            file_patterns_repos_must_exclude: Vec::new(),
            pattern_matches_content: true,
            pattern_matches_path: true,
            result_type: ResultType::Code,
            repo_filters: Vec::new(),
            repo_exclude_filters: Vec::new(),
            repo_group: None,
            languages: Vec::new(),
            excluded_languages: Vec::new(),
            commit_after: None,
            fork: None,
            archived: None,
            count: None,
            timeout: None,
        }
    }
}

impl PatternInfo {
    /// A plain literal search for `pattern`
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    pub fn regexp(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_regexp: true,
            ..Self::default()
        }
    }

    pub fn has_file_presence_filters(&self) -> bool {
        !self.file_patterns_repos_must_include.is_empty()
            || !self.file_patterns_repos_must_exclude.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKind {
    Repo,
    RepoExclude,
    File,
    FileExclude,
    RepoGroup,
    RepoHasFile,
    RepoHasFileExclude,
    RepoHasCommitAfter,
    Type,
    Case,
    Lang,
    LangExclude,
    Fork,
    Archived,
    Count,
    Timeout,
    PatternType,
}

struct FilterDefinition {
    aliases: &'static [&'static str],
    kind: FilterKind,
    discrete_values: Option<&'static [&'static str]>,
}

const FILTERS: &[FilterDefinition] = &[
    FilterDefinition { aliases: &["r", "repo"], kind: FilterKind::Repo, discrete_values: None },
    FilterDefinition { aliases: &["-r", "-repo"], kind: FilterKind::RepoExclude, discrete_values: None },
    FilterDefinition { aliases: &["f", "file"], kind: FilterKind::File, discrete_values: None },
    FilterDefinition { aliases: &["-f", "-file"], kind: FilterKind::FileExclude, discrete_values: None },
    FilterDefinition { aliases: &["repogroup"], kind: FilterKind::RepoGroup, discrete_values: None },
    FilterDefinition { aliases: &["repohasfile"], kind: FilterKind::RepoHasFile, discrete_values: None },
    FilterDefinition { aliases: &["-repohasfile"], kind: FilterKind::RepoHasFileExclude, discrete_values: None },
    FilterDefinition { aliases: &["repohascommitafter"], kind: FilterKind::RepoHasCommitAfter, discrete_values: None },
    FilterDefinition {
        aliases: &["type"],
        kind: FilterKind::Type,
        discrete_values: Some(&["code", "diff", "commit", "symbol", "path"]),
    },
    FilterDefinition { aliases: &["case"], kind: FilterKind::Case, discrete_values: Some(&["yes", "no"]) },
    FilterDefinition { aliases: &["lang"], kind: FilterKind::Lang, discrete_values: None },
    FilterDefinition { aliases: &["-lang"], kind: FilterKind::LangExclude, discrete_values: None },
    FilterDefinition { aliases: &["fork"], kind: FilterKind::Fork, discrete_values: Some(&["yes", "no", "only"]) },
    FilterDefinition { aliases: &["archived"], kind: FilterKind::Archived, discrete_values: Some(&["yes", "no", "only"]) },
    FilterDefinition { aliases: &["count"], kind: FilterKind::Count, discrete_values: None },
    FilterDefinition { aliases: &["timeout"], kind: FilterKind::Timeout, discrete_values: None },
    FilterDefinition {
        aliases: &["patterntype"],
        kind: FilterKind::PatternType,
        discrete_values: Some(&["literal", "regexp", "regex"]),
    },
];

fn validate_filter(field: &str, value: &str) -> SearchResult<FilterKind> {
    let definition = FILTERS
        .iter()
        .find(|def| def.aliases.iter().any(|alias| *alias == field))
        .ok_or_else(|| SearchError::invalid_filter(field, "Invalid filter type"))?;

    if let Some(values) = definition.discrete_values {
        if !values.contains(&value) {
            return Err(SearchError::invalid_filter(
                field,
                format!("Invalid filter value, expected one of: {}", values.join(", ")),
            ));
        }
    }
    if value.is_empty() {
        return Err(SearchError::invalid_filter(field, "Empty filter value"));
    }
    Ok(definition.kind)
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Term(String),
    Filter { field: String, value: String },
}

/// Splits the input on whitespace, keeping quoted sections together
fn tokenize(input: &str) -> SearchResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            tokens.push(Token::Term(read_quoted(&mut chars)?));
            continue;
        }

        let mut word = String::new();
        let mut field = None;
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            if c == ':' && field.is_none() && is_field_name(&word) {
                chars.next();
                field = Some(std::mem::take(&mut word));
                if chars.peek() == Some(&'"') {
                    chars.next();
                    word = read_quoted(&mut chars)?;
                    break;
                }
                continue;
            }
            word.push(c);
            chars.next();
        }

        tokens.push(match field {
            Some(field) => Token::Filter { field, value: word },
            None => Token::Term(word),
        });
    }

    Ok(tokens)
}

fn is_field_name(word: &str) -> bool {
    let name = word.strip_prefix('-').unwrap_or(word);
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphabetic())
}

fn read_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> SearchResult<String> {
    let mut value = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(value),
            '\\' => match chars.next() {
                Some(escaped) => value.push(escaped),
                None => break,
            },
            other => value.push(other),
        }
    }
    Err(SearchError::query_translation("unterminated quoted string"))
}

/// Parses a query string.
pub fn parse(input: &str) -> SearchResult<PatternInfo> {
    let mut info = PatternInfo::default();
    let mut terms = Vec::new();
    let mut excludes = Vec::new();

    for token in tokenize(input)? {
        let (field, value) = match token {
            Token::Term(term) => {
                terms.push(term);
                continue;
            }
            Token::Filter { field, value } => (field, value),
        };

        match validate_filter(&field, &value)? {
            FilterKind::Repo => info.repo_filters.push(value),
            FilterKind::RepoExclude => info.repo_exclude_filters.push(value),
            FilterKind::File => info.include_patterns.push(value),
            FilterKind::FileExclude => excludes.push(value),
            FilterKind::RepoGroup => info.repo_group = Some(value),
            FilterKind::RepoHasFile => info.file_patterns_repos_must_include.push(value),
            FilterKind::RepoHasFileExclude => info.file_patterns_repos_must_exclude.push(value),
            FilterKind::RepoHasCommitAfter => info.commit_after = Some(value),
            FilterKind::Type => {
                info.result_type = match value.as_str() {
                    "symbol" => ResultType::Symbol,
                    "path" => ResultType::Path,
                    "diff" => ResultType::Diff,
                    "commit" => ResultType::Commit,
                    _ => ResultType::Code,
                };
                if info.result_type == ResultType::Path {
                    info.pattern_matches_content = false;
                    info.pattern_matches_path = true;
                }
            }
            FilterKind::Case => info.is_case_sensitive = value == "yes",
            FilterKind::Lang => info.languages.push(value),
            FilterKind::LangExclude => info.excluded_languages.push(value),
            FilterKind::Fork => info.fork = Some(value),
            FilterKind::Archived => info.archived = Some(value),
            FilterKind::Count => {
                let count = value
                    .parse::<usize>()
                    .map_err(|_| SearchError::invalid_filter(&field, "expected an integer"))?;
                info.count = Some(count);
            }
            FilterKind::Timeout => {
                let timeout = humantime::parse_duration(&value)
                    .map_err(|e| SearchError::invalid_filter(&field, e.to_string()))?;
                info.timeout = Some(timeout);
            }
            FilterKind::PatternType => info.is_regexp = value != "literal",
        }
    }

    info.pattern = terms.join(" ");
    if !excludes.is_empty() {
        info.exclude_pattern = Some(excludes.join("|"));
    }
    Ok(info)
}
