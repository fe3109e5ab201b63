use std::collections::BTreeSet;
use std::fmt;

use crate::repos::normalize_repo_name;

/// The backend's native query tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Const(bool),
    RepoSet(RepoSet),
    Substring(Substring),
    Regexp(Regexp),
    /// Matches the child only against symbol definitions
    Symbol(Box<Query>),
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

/// Restricts a query to a set of repositories, by normalized name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoSet {
    set: BTreeSet<String>,
}

impl RepoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str) {
        self.set.insert(normalize_repo_name(name));
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.set.remove(&normalize_repo_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.set.contains(&normalize_repo_name(name))
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.set.iter().map(String::as_str)
    }

    /// Keeps only the names for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.set.retain(|name| keep(name));
    }
}

impl<S: AsRef<str>> FromIterator<S> for RepoSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = RepoSet::new();
        for name in iter {
            set.insert(name.as_ref());
        }
        set
    }
}

/// Literal substring match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substring {
    pub pattern: String,
    pub case_sensitive: bool,
    pub file_name: bool,
    pub content: bool,
}

/// Regular expression match. The pattern has been validated by the translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regexp {
    pub pattern: String,
    pub case_sensitive: bool,
    pub file_name: bool,
    pub content: bool,
}

impl Query {
    pub fn and(children: Vec<Query>) -> Query {
        Query::And(children)
    }

    pub fn not(child: Query) -> Query {
        Query::Not(Box::new(child))
    }

    pub fn symbol(child: Query) -> Query {
        Query::Symbol(Box::new(child))
    }

    /// Regexp over file names only
    pub fn file_regexp(pattern: impl Into<String>, case_sensitive: bool) -> Query {
        Query::Regexp(Regexp {
            pattern: pattern.into(),
            case_sensitive,
            file_name: true,
            content: false,
        })
    }

    /// Flattens nested boolean operators and folds constants.
    pub fn simplify(self) -> Query {
        match self {
            Query::And(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children.into_iter().map(Query::simplify) {
                    match child {
                        Query::Const(true) => {}
                        Query::Const(false) => return Query::Const(false),
                        Query::And(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => Query::Const(true),
                    1 => flat.remove(0),
                    _ => Query::And(flat),
                }
            }
            Query::Or(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children.into_iter().map(Query::simplify) {
                    match child {
                        Query::Const(false) => {}
                        Query::Const(true) => return Query::Const(true),
                        Query::Or(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => Query::Const(false),
                    1 => flat.remove(0),
                    _ => Query::Or(flat),
                }
            }
            Query::Not(child) => match child.simplify() {
                Query::Const(b) => Query::Const(!b),
                Query::Not(inner) => *inner,
                other => Query::not(other),
            },
            Query::Symbol(child) => Query::symbol(child.simplify()),
            other => other,
        }
    }

    /// The repository restriction at the top of the query, if any
    pub fn repo_set(&self) -> Option<&RepoSet> {
        match self {
            Query::RepoSet(set) => Some(set),
            Query::And(children) => children.iter().find_map(|child| match child {
                Query::RepoSet(set) => Some(set),
                _ => None,
            }),
            _ => None,
        }
    }
}

fn match_prefix(case_sensitive: bool, file_name: bool, content: bool, kind: &str) -> String {
    let mut prefix = String::new();
    if case_sensitive {
        prefix.push_str("case_");
    }
    match (file_name, content) {
        (true, false) => prefix.push_str("file_"),
        (false, true) => prefix.push_str("content_"),
        _ => {}
    }
    prefix.push_str(kind);
    prefix
}

fn write_list(f: &mut fmt::Formatter<'_>, op: &str, children: &[Query]) -> fmt::Result {
    write!(f, "({}", op)?;
    for child in children {
        write!(f, " {}", child)?;
    }
    write!(f, ")")
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Const(true) => write!(f, "TRUE"),
            Query::Const(false) => write!(f, "FALSE"),
            Query::RepoSet(set) => {
                write!(f, "reposet:")?;
                for (i, name) in set.names().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", name)?;
                }
                Ok(())
            }
            Query::Substring(s) => write!(
                f,
                "{}:{:?}",
                match_prefix(s.case_sensitive, s.file_name, s.content, "substr"),
                s.pattern
            ),
            Query::Regexp(r) => write!(
                f,
                "{}:{:?}",
                match_prefix(r.case_sensitive, r.file_name, r.content, "regex"),
                r.pattern
            ),
            Query::Symbol(child) => write!(f, "sym:{}", child),
            Query::And(children) => write_list(f, "and", children),
            Query::Or(children) => write_list(f, "or", children),
            Query::Not(child) => write!(f, "(not {})", child),
        }
    }
}
