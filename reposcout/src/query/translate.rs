use regex::RegexBuilder;

use super::ast::{Query, Regexp, Substring};
use super::parser::{PatternInfo, ResultType};
use crate::errors::{SearchError, SearchResult};

/// Translates the caller's query into the backend's query tree.
///
/// The repository restriction is not part of the result; see `compose`.
pub fn to_backend_query(info: &PatternInfo, is_symbol: bool) -> SearchResult<Query> {
    reject_unsupported(info)?;

    let mut and = Vec::new();

    let mut q = if info.pattern.is_empty() {
        Query::Const(true)
    } else if info.is_regexp {
        let file_name_only = info.pattern_matches_path && !info.pattern_matches_content;
        parse_re(&info.pattern, file_name_only, info.is_case_sensitive)?
    } else {
        Query::Substring(Substring {
            pattern: info.pattern.clone(),
            case_sensitive: info.is_case_sensitive,
            file_name: info.pattern_matches_path,
            content: info.pattern_matches_content,
        })
    };
    if is_symbol || info.result_type == ResultType::Symbol {
        q = Query::symbol(q);
    }
    and.push(q);

    // File filters are regular expressions over the path
    for pattern in &info.include_patterns {
        and.push(file_re(pattern, info.is_case_sensitive)?);
    }
    if let Some(pattern) = &info.exclude_pattern {
        and.push(Query::not(file_re(pattern, info.is_case_sensitive)?));
    }

    Ok(Query::and(and).simplify())
}

fn reject_unsupported(info: &PatternInfo) -> SearchResult<()> {
    if !info.languages.is_empty() || !info.excluded_languages.is_empty() {
        return Err(SearchError::query_translation(
            "lang filters are not supported by the search backend",
        ));
    }
    if info.commit_after.is_some() {
        return Err(SearchError::query_translation(
            "repohascommitafter is not supported by the search backend",
        ));
    }
    if info.fork.is_some() || info.archived.is_some() {
        return Err(SearchError::query_translation(
            "fork and archived filters are not supported by the search backend",
        ));
    }
    match info.result_type {
        ResultType::Diff | ResultType::Commit => Err(SearchError::query_translation(
            "diff and commit searches are not supported by the search backend",
        )),
        _ => Ok(()),
    }
}

/// Validates `pattern` and wraps it as a regexp query
pub(crate) fn parse_re(pattern: &str, file_name_only: bool, case_sensitive: bool) -> SearchResult<Query> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| {
            SearchError::query_translation(format!("invalid regex {:?}: {}", pattern, e))
        })?;

    Ok(Query::Regexp(Regexp {
        pattern: pattern.to_string(),
        case_sensitive,
        file_name: true,
        content: !file_name_only,
    }))
}

pub(crate) fn file_re(pattern: &str, case_sensitive: bool) -> SearchResult<Query> {
    parse_re(pattern, true, case_sensitive)
}
