/// This module implements `LocalSearcher`, a `Searcher` over a directory tree on disk.
///
/// # Layout
///
/// Every directory at a fixed depth below the root is one repository. With the default
/// depth of 2:
/// ```text
/// root/
///   acme/
///     foo/      <- repository "acme/foo"
///     bar/      <- repository "acme/bar"
///   tools/
///     lint/     <- repository "tools/lint"
/// ```
///
/// # Rust vs .NET Concurrency
///
/// A .NET port would use `Parallel.ForEach` inside `Task.Run`:
/// ```csharp
/// await Task.Run(() => Parallel.ForEach(files, file => Process(file)), token);
/// ```
///
/// Here the CPU-bound walk runs on tokio's blocking pool and fans out with rayon. The async
/// side races the blocking task against the caller's `SearchContext`; when the context ends
/// first, a shared flag tells the workers to stop picking up files.
pub mod matcher;
pub(crate) mod processor;

use async_trait::async_trait;
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::backend::{SearchOptions, Searcher};
use crate::context::SearchContext;
use crate::errors::{SearchError, SearchResult};
use crate::filters::should_include_file;
use crate::query::Query;
use crate::repos::{normalize_repo_name, RepoList, Repository};
use crate::results::SearchResult as SearchOutput;
use processor::{FileProcessor, Processed};

/// Default depth of repository directories below the root
pub const DEFAULT_REPO_DEPTH: usize = 2;

/// A repository directory found under the root
#[derive(Debug, Clone)]
struct LocalRepo {
    name: String,
    path: PathBuf,
}

/// A file inside a repository
#[derive(Debug, Clone)]
struct LocalFile {
    repository: String,
    rel_path: String,
    path: PathBuf,
}

#[derive(Debug)]
struct LocalIndex {
    root: PathBuf,
    repo_depth: usize,
    ignore_patterns: Vec<String>,
}

/// Searches repositories laid out as directories under a root
#[derive(Debug, Clone)]
pub struct LocalSearcher {
    index: Arc<LocalIndex>,
}

impl LocalSearcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            index: Arc::new(LocalIndex {
                root: root.into(),
                repo_depth: DEFAULT_REPO_DEPTH,
                ignore_patterns: Vec::new(),
            }),
        }
    }

    pub fn with_repo_depth(self, repo_depth: usize) -> Self {
        self.rebuild(|index| index.repo_depth = repo_depth.max(1))
    }

    /// Glob patterns matched against repository-relative paths
    pub fn with_ignore_patterns(self, ignore_patterns: Vec<String>) -> Self {
        self.rebuild(|index| index.ignore_patterns = ignore_patterns)
    }

    pub fn root(&self) -> &Path {
        &self.index.root
    }

    fn rebuild(self, f: impl FnOnce(&mut LocalIndex)) -> Self {
        let mut index = LocalIndex {
            root: self.index.root.clone(),
            repo_depth: self.index.repo_depth,
            ignore_patterns: self.index.ignore_patterns.clone(),
        };
        f(&mut index);
        Self {
            index: Arc::new(index),
        }
    }

    /// Runs `work` on the blocking pool, giving up when `ctx` ends
    async fn run_blocking<T, F>(&self, ctx: &SearchContext, work: F) -> SearchResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&LocalIndex, &AtomicBool) -> SearchResult<T> + Send + 'static,
    {
        let index = Arc::clone(&self.index);
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let handle = tokio::task::spawn_blocking(move || work(&index, &worker_stop));

        let result = ctx
            .run(async move {
                handle
                    .await
                    .map_err(|e| SearchError::backend(format!("local search task failed: {}", e)))?
            })
            .await;
        if result.is_err() {
            stop.store(true, Ordering::Relaxed);
        }
        result
    }
}

impl LocalIndex {
    fn discover_repos(&self) -> SearchResult<Vec<LocalRepo>> {
        std::fs::metadata(&self.root)?;

        let mut repos: Vec<LocalRepo> = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .hidden(true)
            .max_depth(Some(self.repo_depth))
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.depth() == self.repo_depth)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_dir()))
            .filter_map(|entry| {
                let rel = entry.path().strip_prefix(&self.root).ok()?;
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                Some(LocalRepo {
                    name,
                    path: entry.into_path(),
                })
            })
            .collect();
        repos.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("Found {} repositories under {}", repos.len(), self.root.display());
        Ok(repos)
    }

    fn repo_files(&self, repo: &LocalRepo) -> Vec<LocalFile> {
        WalkBuilder::new(&repo.path)
            .hidden(true)
            .ignore(true)
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false)
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(|entry| {
                let rel = entry.path().strip_prefix(&repo.path).ok()?;
                if !should_include_file(rel, &self.ignore_patterns) {
                    return None;
                }
                let rel_path = rel.to_string_lossy().replace('\\', "/");
                Some(LocalFile {
                    repository: repo.name.clone(),
                    rel_path,
                    path: entry.into_path(),
                })
            })
            .collect()
    }

    /// Repositories the query can possibly match, judged by its top-level restriction
    fn candidate_repos(&self, query: &Query) -> SearchResult<Vec<LocalRepo>> {
        let repos = self.discover_repos()?;
        Ok(match query.repo_set() {
            Some(set) => repos
                .into_iter()
                .filter(|repo| set.contains(&repo.name))
                .collect(),
            None => repos,
        })
    }

    fn search(
        &self,
        query: &Query,
        opts: &SearchOptions,
        stop: &AtomicBool,
    ) -> SearchResult<SearchOutput> {
        let started = Instant::now();
        let wall_deadline = opts.max_wall_time.map(|budget| started + budget);

        let files: Vec<LocalFile> = self
            .candidate_repos(query)?
            .iter()
            .flat_map(|repo| self.repo_files(repo))
            .collect();
        debug!("Found {} files to process", files.len());

        let exceeded = AtomicBool::new(false);
        let processor = FileProcessor::new(query);
        let outcomes = files
            .par_iter()
            .map(|file| {
                if stop.load(Ordering::Relaxed) {
                    return Ok(Processed::Skipped);
                }
                if wall_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    exceeded.store(true, Ordering::Relaxed);
                    return Ok(Processed::Skipped);
                }
                processor.process(&file.repository, &file.rel_path, &file.path)
            })
            .collect::<SearchResult<Vec<_>>>()?;

        let mut result = SearchOutput::new();
        result.stats.files_considered = files.len();

        let mut matched = Vec::new();
        for outcome in outcomes {
            match outcome {
                Processed::Matched(file_match) => {
                    result.stats.files_loaded += 1;
                    matched.push(file_match);
                }
                Processed::NoMatch => result.stats.files_loaded += 1,
                Processed::Skipped => result.stats.files_skipped += 1,
            }
        }
        matched.sort_by(|a, b| {
            (&a.repository, &a.file_name).cmp(&(&b.repository, &b.file_name))
        });

        let mut per_repo: HashMap<String, usize> = HashMap::new();
        for file_match in matched {
            if opts.max_doc_display_count > 0 && result.files.len() >= opts.max_doc_display_count {
                break;
            }
            if opts.total_max_match_count > 0
                && result.stats.match_count >= opts.total_max_match_count
            {
                break;
            }
            let repo_count = per_repo
                .entry(normalize_repo_name(&file_match.repository))
                .or_default();
            if opts.shard_max_match_count > 0 && *repo_count >= opts.shard_max_match_count {
                continue;
            }
            *repo_count += file_match.line_matches.len();
            result.add_file_match(file_match);
        }

        result.stats.wall_time_exceeded = exceeded.load(Ordering::Relaxed);
        result.stats.duration = started.elapsed();
        info!(
            "Search complete. Found {} matches in {} files",
            result.stats.match_count, result.stats.file_count
        );
        Ok(result)
    }

    fn list(&self, query: &Query, stop: &AtomicBool) -> SearchResult<RepoList> {
        let list_everything = matches!(query, Query::Const(true));
        let mut listed = Vec::new();

        for repo in self.candidate_repos(query)? {
            if stop.load(Ordering::Relaxed) {
                return Err(SearchError::Canceled);
            }
            let keep = list_everything || {
                let processor = FileProcessor::new(query);
                self.repo_files(&repo)
                    .par_iter()
                    .map(|file| processor.matches(&file.repository, &file.rel_path, &file.path))
                    .collect::<SearchResult<Vec<bool>>>()?
                    .into_iter()
                    .any(|hit| hit)
            };
            if keep {
                listed.push(
                    Repository::new(repo.name.clone())
                        .with_metadata("path", repo.path.to_string_lossy()),
                );
            }
        }
        debug!("Listed {} repositories", listed.len());
        Ok(RepoList::from_repositories(listed))
    }
}

#[async_trait]
impl Searcher for LocalSearcher {
    async fn search(
        &self,
        ctx: &SearchContext,
        query: &Query,
        opts: &SearchOptions,
    ) -> SearchResult<SearchOutput> {
        let query = query.clone();
        let opts = opts.clone();
        self.run_blocking(ctx, move |index, stop| index.search(&query, &opts, stop))
            .await
    }

    async fn list(&self, ctx: &SearchContext, query: &Query) -> SearchResult<RepoList> {
        let query = query.clone();
        self.run_blocking(ctx, move |index, stop| index.list(&query, stop))
            .await
    }
}

impl fmt::Display for LocalSearcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local({})", self.index.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{RepoSet, Substring};
    use std::fs;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = tempdir().unwrap();
        write(dir.path(), "acme/foo/src/lib.rs", "fn needle() {}\n");
        write(dir.path(), "acme/foo/README.md", "no match here\n");
        write(dir.path(), "acme/bar/main.go", "// Needle in go\n");
        write(dir.path(), "acme/bar/target/debug/out.rs", "needle\n");
        fs::create_dir_all(dir.path().join("tools/empty")).unwrap();
        dir
    }

    fn needle() -> Query {
        Query::Substring(Substring {
            pattern: "needle".to_string(),
            case_sensitive: false,
            file_name: true,
            content: true,
        })
    }

    #[tokio::test]
    async fn test_list_all_includes_empty_repos() {
        let dir = fixture();
        let searcher = LocalSearcher::new(dir.path());
        let list = searcher
            .list(&SearchContext::background(), &Query::Const(true))
            .await
            .unwrap();
        let names: Vec<_> = list.repos.iter().map(|r| r.repository.name.as_str()).collect();
        assert_eq!(names, vec!["acme/bar", "acme/foo", "tools/empty"]);
    }

    #[tokio::test]
    async fn test_list_with_file_selector() {
        let dir = fixture();
        let searcher = LocalSearcher::new(dir.path());
        let repos: RepoSet = ["acme/foo", "acme/bar", "tools/empty"].into_iter().collect();
        let selector = Query::and(vec![Query::RepoSet(repos), Query::file_regexp(r"\.go$", false)]);
        let list = searcher
            .list(&SearchContext::background(), &selector)
            .await
            .unwrap();
        let names: Vec<_> = list.repos.iter().map(|r| r.repository.name.as_str()).collect();
        assert_eq!(names, vec!["acme/bar"]);
    }

    #[tokio::test]
    async fn test_search_respects_restriction_and_ignores_target() {
        let dir = fixture();
        let searcher = LocalSearcher::new(dir.path());
        let repos: RepoSet = ["acme/foo", "acme/bar"].into_iter().collect();
        let query = Query::and(vec![Query::RepoSet(repos), needle()]);
        let result = searcher
            .search(&SearchContext::background(), &query, &SearchOptions::default())
            .await
            .unwrap();

        let hits: Vec<_> = result
            .files
            .iter()
            .map(|f| format!("{}:{}", f.repository, f.file_name))
            .collect();
        assert_eq!(hits, vec!["acme/bar:main.go", "acme/foo:src/lib.rs"]);
        assert!(!result.stats.wall_time_exceeded);

        let only_foo: RepoSet = ["ACME/FOO"].into_iter().collect();
        let query = Query::and(vec![Query::RepoSet(only_foo), needle()]);
        let result = searcher
            .search(&SearchContext::background(), &query, &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].repository, "acme/foo");
    }

    #[tokio::test]
    async fn test_spent_wall_time_returns_partial_result() {
        let dir = fixture();
        let searcher = LocalSearcher::new(dir.path());
        let opts = SearchOptions {
            max_wall_time: Some(Duration::ZERO),
            ..SearchOptions::default()
        };
        let result = searcher
            .search(&SearchContext::background(), &needle(), &opts)
            .await
            .unwrap();
        assert!(result.stats.wall_time_exceeded);
        assert!(result.files.is_empty());
        assert_eq!(result.stats.files_skipped, result.stats.files_considered);
    }

    #[tokio::test]
    async fn test_max_doc_display_count() {
        let dir = fixture();
        let searcher = LocalSearcher::new(dir.path());
        let opts = SearchOptions {
            max_doc_display_count: 1,
            ..SearchOptions::default()
        };
        let result = searcher
            .search(&SearchContext::background(), &needle(), &opts)
            .await
            .unwrap();
        assert_eq!(result.files.len(), 1);
    }

    #[tokio::test]
    async fn test_canceled_context() {
        let dir = fixture();
        let searcher = LocalSearcher::new(dir.path());
        let ctx = SearchContext::background().with_cancel();
        ctx.cancel();
        let err = searcher.list(&ctx, &Query::Const(true)).await.unwrap_err();
        assert!(matches!(err, SearchError::Canceled));
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let searcher = LocalSearcher::new(dir.path().join("missing"));
        let err = searcher
            .list(&SearchContext::background(), &Query::Const(true))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Io(_)));
    }

    #[test]
    fn test_display() {
        let searcher = LocalSearcher::new("/srv/repos").with_repo_depth(1);
        assert_eq!(searcher.to_string(), "local(/srv/repos)");
    }
}
