//! Repository records and the immutable snapshot the cache publishes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Normalizes a repository name for lookup.
///
/// Every comparison of repository names goes through here so that the
/// restriction, the cache snapshot and file-presence filtering agree.
pub fn normalize_repo_name(name: &str) -> String {
    name.to_lowercase()
}

/// A repository as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    /// Engine specific details, carried through untouched
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Repository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One entry of a `List` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoListEntry {
    pub repository: Repository,
}

/// Response of the backend `List` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoList {
    pub repos: Vec<RepoListEntry>,
}

impl RepoList {
    pub fn from_repositories(repos: impl IntoIterator<Item = Repository>) -> Self {
        Self {
            repos: repos
                .into_iter()
                .map(|repository| RepoListEntry { repository })
                .collect(),
        }
    }
}

/// A repository selected by the caller, optionally pinned to revisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRevisions {
    pub name: String,
    pub revs: Vec<String>,
}

impl RepositoryRevisions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revs: Vec::new(),
        }
    }
}

/// Immutable mapping from normalized name to repository.
///
/// Cloning shares the underlying map. A refresh builds a new set rather
/// than touching a published one.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RepositorySet {
    repos: Arc<HashMap<String, Repository>>,
}

impl RepositorySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repos.get(&normalize_repo_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Normalized names, in no particular order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.repos.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Repository)> {
        self.repos.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when both handles point at the very same snapshot
    pub fn same_snapshot(&self, other: &RepositorySet) -> bool {
        Arc::ptr_eq(&self.repos, &other.repos)
    }
}

impl From<RepoList> for RepositorySet {
    fn from(list: RepoList) -> Self {
        list.repos.into_iter().map(|entry| entry.repository).collect()
    }
}

impl FromIterator<Repository> for RepositorySet {
    fn from_iter<I: IntoIterator<Item = Repository>>(iter: I) -> Self {
        let repos = iter
            .into_iter()
            .map(|repo| (normalize_repo_name(&repo.name), repo))
            .collect::<HashMap<_, _>>();
        Self {
            repos: Arc::new(repos),
        }
    }
}

impl fmt::Debug for RepositorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_set().entries(names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let set: RepositorySet = vec![Repository::new("Acme/Foo")].into_iter().collect();
        assert!(set.contains("acme/foo"));
        assert!(set.contains("ACME/FOO"));
        assert_eq!(set.get("acme/FOO").unwrap().name, "Acme/Foo");
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["acme/foo"]);
    }

    #[test]
    fn test_from_repo_list() {
        let list = RepoList::from_repositories(vec![
            Repository::new("acme/foo").with_metadata("branch", "main"),
            Repository::new("acme/bar"),
        ]);
        let set = RepositorySet::from(list);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("acme/foo").unwrap().metadata["branch"], "main");
    }

    #[test]
    fn test_clones_share_snapshot() {
        let set: RepositorySet = vec![Repository::new("a")].into_iter().collect();
        let copy = set.clone();
        assert!(set.same_snapshot(&copy));

        let rebuilt: RepositorySet = vec![Repository::new("a")].into_iter().collect();
        assert_eq!(set, rebuilt);
        assert!(!set.same_snapshot(&rebuilt));
    }
}
