#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use reposcout::{
    FileMatch, LineMatch, Query, RepoList, Repository, SearchContext, SearchError, SearchOptions,
    SearchOutput, SearchResult, Searcher,
};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory backend whose answers are scripted by the test
pub struct FakeSearcher {
    /// Answers to `List(TRUE)`, consumed in order
    list_script: Mutex<VecDeque<SearchResult<RepoList>>>,
    /// Answer once the script runs out
    list_fallback: Mutex<SearchResult<RepoList>>,
    /// File path pattern -> repositories holding such a file
    files: Mutex<HashMap<String, Vec<String>>>,
    search_delay: Mutex<Option<Duration>>,
    list_delay: Mutex<Option<Duration>>,
    pub list_all_calls: AtomicUsize,
    pub selector_list_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub searches: Mutex<Vec<(Query, SearchOptions)>>,
    pub selectors: Mutex<Vec<Query>>,
}

pub fn repo_list(names: &[&str]) -> RepoList {
    RepoList::from_repositories(names.iter().map(|name| Repository::new(*name)))
}

impl FakeSearcher {
    pub fn new(fallback: SearchResult<RepoList>) -> Self {
        Self {
            list_script: Mutex::new(VecDeque::new()),
            list_fallback: Mutex::new(fallback),
            files: Mutex::new(HashMap::new()),
            search_delay: Mutex::new(None),
            list_delay: Mutex::new(None),
            list_all_calls: AtomicUsize::new(0),
            selector_list_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            searches: Mutex::new(Vec::new()),
            selectors: Mutex::new(Vec::new()),
        }
    }

    pub fn with_repos(names: &[&str]) -> Self {
        Self::new(Ok(repo_list(names)))
    }

    pub fn failing() -> Self {
        Self::new(Err(SearchError::backend("connection refused")))
    }

    pub fn script(&self, outcomes: Vec<SearchResult<RepoList>>) {
        self.list_script.lock().extend(outcomes);
    }

    pub fn set_fallback(&self, outcome: SearchResult<RepoList>) {
        *self.list_fallback.lock() = outcome;
    }

    /// Declares which repositories hold a file matching `pattern`
    pub fn add_file(&self, pattern: &str, repos: &[&str]) {
        self.files.lock().insert(
            pattern.to_string(),
            repos.iter().map(|r| r.to_string()).collect(),
        );
    }

    pub fn set_search_delay(&self, delay: Duration) {
        *self.search_delay.lock() = Some(delay);
    }

    /// Slows down every `List(TRUE)` so concurrent callers overlap
    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock() = Some(delay);
    }

    pub fn list_all_calls(&self) -> usize {
        self.list_all_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn last_search(&self) -> Option<(Query, SearchOptions)> {
        self.searches.lock().last().cloned()
    }
}

fn file_pattern(query: &Query) -> Option<&str> {
    match query {
        Query::Regexp(r) if r.file_name && !r.content => Some(&r.pattern),
        Query::And(children) => children.iter().find_map(file_pattern),
        _ => None,
    }
}

#[async_trait]
impl Searcher for FakeSearcher {
    async fn search(
        &self,
        ctx: &SearchContext,
        query: &Query,
        opts: &SearchOptions,
    ) -> SearchResult<SearchOutput> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.searches.lock().push((query.clone(), opts.clone()));

        let delay = *self.search_delay.lock();
        if let Some(delay) = delay {
            ctx.run(async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
        }

        let mut result = SearchOutput::new();
        if let Some(set) = query.repo_set() {
            for name in set.names() {
                result.add_file_match(FileMatch {
                    repository: name.to_string(),
                    file_name: "main.go".to_string(),
                    line_matches: vec![LineMatch {
                        line_number: 1,
                        line: "needle".to_string(),
                        fragments: vec![(0, 6)],
                        file_name: false,
                    }],
                });
            }
        }
        Ok(result)
    }

    async fn list(&self, _ctx: &SearchContext, query: &Query) -> SearchResult<RepoList> {
        if matches!(query, Query::Const(true)) {
            self.list_all_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.list_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let scripted = self.list_script.lock().pop_front();
            return scripted.unwrap_or_else(|| self.list_fallback.lock().clone());
        }

        self.selector_list_calls.fetch_add(1, Ordering::SeqCst);
        self.selectors.lock().push(query.clone());
        let selected = query.repo_set().cloned().unwrap_or_default();
        let holders = file_pattern(query)
            .and_then(|pattern| self.files.lock().get(pattern).cloned())
            .unwrap_or_default();
        Ok(repo_list(
            &holders
                .iter()
                .filter(|name| selected.contains(name))
                .map(String::as_str)
                .collect::<Vec<_>>(),
        ))
    }
}

impl fmt::Display for FakeSearcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fake")
    }
}
