//! Path predicates selecting entries of the remote index.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Selects remote items by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathPredicate {
    /// Exactly one path.
    Exact(PathBuf),
    /// Membership in a finite set of paths.
    AnyOf(BTreeSet<PathBuf>),
    /// Every path under a prefix (the prefix itself excluded).
    Prefix(PathBuf),
}

impl PathPredicate {
    /// Match a single path.
    pub fn exact(path: impl Into<PathBuf>) -> Self {
        Self::Exact(path.into())
    }

    /// Match any of the given paths.
    pub fn any_of<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::AnyOf(paths.into_iter().map(Into::into).collect())
    }

    /// Match everything below a directory.
    pub fn prefix(path: impl Into<PathBuf>) -> Self {
        Self::Prefix(path.into())
    }

    /// Check whether a path is selected.
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            Self::Exact(target) => path == target,
            Self::AnyOf(targets) => targets.contains(path),
            Self::Prefix(root) => path != root && path.starts_with(root),
        }
    }

    /// Whether the predicate can never match anything.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::AnyOf(targets) if targets.is_empty())
    }

    /// The concrete paths named by the predicate, if it is not a prefix.
    pub fn targets(&self) -> Vec<&Path> {
        match self {
            Self::Exact(path) => vec![path.as_path()],
            Self::AnyOf(paths) => paths.iter().map(PathBuf::as_path).collect(),
            Self::Prefix(_) => Vec::new(),
        }
    }
}

impl std::fmt::Display for PathPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(path) => write!(f, "path == {}", path.display()),
            Self::AnyOf(paths) => write!(f, "path in [{} paths]", paths.len()),
            Self::Prefix(root) => write!(f, "path beginswith {}", root.display()),
        }
    }
}
