//! Builds the final backend query from the caller's query and repository selection.

use std::collections::HashSet;
use tracing::debug;

use super::ast::{Query, RepoSet};
use super::parser::PatternInfo;
use super::translate::file_re;
use crate::backend::Searcher;
use crate::context::SearchContext;
use crate::errors::{SearchError, SearchResult};
use crate::repos::{normalize_repo_name, RepositoryRevisions};

/// Restriction selecting exactly the caller's repositories
pub fn restrict_to(repos: &[RepositoryRevisions]) -> RepoSet {
    repos.iter().map(|repo| repo.name.as_str()).collect()
}

/// The final query: the restriction is always the first operand
pub fn compose(restriction: RepoSet, query: Query) -> Query {
    Query::and(vec![Query::RepoSet(restriction), query])
}

/// Narrows `repo_set` using the query's `repohasfile` and `-repohasfile` filters.
///
/// For each filter the backend is asked which of the selected repositories contain a
/// file whose path matches the pattern. Repositories are kept (or dropped, for the
/// negated form) based on that answer, so the result is always a subset of `repo_set`.
/// Every pattern is validated before the first backend call.
pub async fn apply_file_presence_filters(
    ctx: &SearchContext,
    info: &PatternInfo,
    searcher: &dyn Searcher,
    mut repo_set: RepoSet,
) -> SearchResult<RepoSet> {
    let include = file_presence_queries(&info.file_patterns_repos_must_include, info)?;
    let exclude = file_presence_queries(&info.file_patterns_repos_must_exclude, info)?;

    for (pattern, file_query) in include {
        let matching = repos_with_file(ctx, searcher, &repo_set, file_query).await?;
        repo_set.retain(|name| matching.contains(name));
        debug!("repohasfile:{} leaves {} repositories", pattern, repo_set.len());
    }

    for (pattern, file_query) in exclude {
        let matching = repos_with_file(ctx, searcher, &repo_set, file_query).await?;
        repo_set.retain(|name| !matching.contains(name));
        debug!("-repohasfile:{} leaves {} repositories", pattern, repo_set.len());
    }

    Ok(repo_set)
}

fn file_presence_queries<'a>(
    patterns: &'a [String],
    info: &PatternInfo,
) -> SearchResult<Vec<(&'a str, Query)>> {
    patterns
        .iter()
        .map(|pattern| {
            let q = file_re(pattern, info.is_case_sensitive).map_err(|e| match e {
                SearchError::QueryTranslation(msg) => SearchError::query_translation(format!(
                    "malformed repohasfile filter: {}",
                    msg
                )),
                other => other,
            })?;
            Ok((pattern.as_str(), q))
        })
        .collect()
}

async fn repos_with_file(
    ctx: &SearchContext,
    searcher: &dyn Searcher,
    repo_set: &RepoSet,
    file_query: Query,
) -> SearchResult<HashSet<String>> {
    if repo_set.is_empty() {
        return Ok(HashSet::new());
    }

    let selector = compose(repo_set.clone(), file_query);
    let resp = searcher.list(ctx, &selector).await?;
    Ok(resp
        .repos
        .iter()
        .map(|entry| normalize_repo_name(&entry.repository.name))
        .collect())
}
