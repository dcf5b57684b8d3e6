//! The interface a remote storage provider must satisfy.

use std::path::{Path, PathBuf};

use tokio::sync::broadcast;

use crate::{PathPredicate, RemoteItem, StoreResult};

/// Notification that the provider's index changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexChange {
    /// Paths known to have changed. Empty means "unknown, re-query".
    pub paths: Vec<PathBuf>,
}

impl IndexChange {
    /// A change touching the given paths.
    pub fn paths(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

/// A remote, eventually-consistent file store mirrored into local paths.
///
/// Implementations own the index and publish an [`IndexChange`] whenever it
/// changes. Callers re-run [`CloudProvider::query`] on every change.
pub trait CloudProvider: Send + Sync + 'static {
    /// Whether a remote identity is signed in.
    fn is_identity_available(&self) -> bool;

    /// Local root of the container with the given identifier.
    fn container_root(&self, container_id: &str) -> Option<PathBuf>;

    /// Ask the provider to materialize a remote item locally.
    fn start_downloading(&self, path: &Path) -> StoreResult<()>;

    /// Tell the provider a path under a container was written or removed
    /// locally.
    fn note_local_change(&self, path: &Path);

    /// Current index entries matching the predicate.
    fn query(&self, predicate: &PathPredicate) -> StoreResult<Vec<RemoteItem>>;

    /// Subscribe to index change notifications.
    fn subscribe(&self) -> broadcast::Receiver<IndexChange>;
}
