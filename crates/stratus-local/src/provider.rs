//! Directory-backed provider with a simulated sync index.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use stratus_core::resolver::placeholder_path;
use stratus_core::{
    CloudProvider, DownloadStatus, IndexChange, PathPredicate, RemoteItem, StoreError,
    StoreResult, TransferError, TransferState,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::index::{self, DiskEntry};

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_SIZE: usize = 256;

/// Sync state the simulated daemon tracks for one path.
#[derive(Debug, Clone, PartialEq)]
struct SyncState {
    transfer: TransferState,
    percent: f64,
    error: Option<TransferError>,
}

impl SyncState {
    fn new(transfer: TransferState) -> Self {
        Self {
            transfer,
            percent: 0.0,
            error: None,
        }
    }
}

/// A provider whose containers are plain directories under `base_dir`.
///
/// Files copied into a container are reported as uploading until the
/// transfer is stepped to completion. Remote-only files are represented by
/// `.<name>.icloud` placeholders which hold the remote bytes until they are
/// materialized by a download.
pub struct LocalProvider {
    base_dir: PathBuf,
    signed_in: AtomicBool,
    states: DashMap<PathBuf, SyncState>,
    changes: broadcast::Sender<IndexChange>,
}

impl LocalProvider {
    /// Create a provider rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            base_dir: base_dir.into(),
            signed_in: AtomicBool::new(true),
            states: DashMap::new(),
            changes,
        }
    }

    /// Directory holding all containers.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Sign the simulated identity in or out.
    pub fn set_signed_in(&self, signed_in: bool) {
        self.signed_in.store(signed_in, Ordering::SeqCst);
    }

    /// Publish an index change for the given paths.
    pub fn notify(&self, paths: Vec<PathBuf>) {
        // No receivers simply means nobody is watching.
        let _ = self.changes.send(IndexChange::paths(paths));
    }

    /// Turn a materialized file into a remote-only placeholder.
    pub fn evict(&self, path: &Path) -> StoreResult<()> {
        let placeholder = placeholder_path(path)
            .ok_or_else(|| StoreError::invalid(format!("not a file path: {}", path.display())))?;
        std::fs::rename(path, &placeholder).map_err(|e| StoreError::io(path, e))?;
        self.states.remove(path);
        debug!(path = %path.display(), "evicted to placeholder");
        self.notify(vec![path.to_path_buf()]);
        Ok(())
    }

    /// Set the percent of an in-flight transfer.
    pub fn set_progress(&self, path: &Path, percent: f64) {
        if let Some(mut state) = self.states.get_mut(path) {
            state.percent = percent.clamp(0.0, 100.0);
        }
        self.notify(vec![path.to_path_buf()]);
    }

    /// Attach a transfer failure to a path.
    pub fn fail(&self, path: &Path, error: TransferError) {
        self.states
            .entry(path.to_path_buf())
            .or_insert_with(|| SyncState::new(TransferState::Idle))
            .error = Some(error);
        self.notify(vec![path.to_path_buf()]);
    }

    /// Number of paths with an in-flight transfer.
    pub fn in_flight(&self) -> usize {
        self.states
            .iter()
            .filter(|s| s.transfer != TransferState::Idle && s.error.is_none())
            .count()
    }

    /// Advance every in-flight transfer by `delta` percent.
    ///
    /// Completed uploads are settled and completed downloads are
    /// materialized. Returns the number of transfers that moved.
    pub fn step(&self, delta: f64) -> usize {
        let mut touched = Vec::new();
        let mut finished = Vec::new();

        for mut entry in self.states.iter_mut() {
            if entry.transfer == TransferState::Idle || entry.error.is_some() {
                continue;
            }
            entry.percent = (entry.percent + delta).min(100.0);
            touched.push(entry.key().clone());
            if entry.percent >= 100.0 {
                finished.push((entry.key().clone(), entry.transfer));
            }
        }

        for (path, transfer) in finished {
            match transfer {
                TransferState::Downloading => self.materialize(&path),
                _ => {
                    self.states.remove(&path);
                }
            }
        }

        if !touched.is_empty() {
            self.notify(touched.clone());
        }
        touched.len()
    }

    /// Step repeatedly until nothing is in flight, bounded by `max_steps`.
    pub fn settle_all(&self, max_steps: usize) {
        for _ in 0..max_steps {
            if self.step(100.0) == 0 {
                break;
            }
        }
    }

    fn materialize(&self, path: &Path) {
        let result = placeholder_path(path)
            .ok_or_else(|| std::io::Error::other("no placeholder name"))
            .and_then(|placeholder| std::fs::rename(&placeholder, path));

        match result {
            Ok(()) => {
                self.states.remove(path);
                debug!(path = %path.display(), "materialized");
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "materialization failed");
                if let Some(mut state) = self.states.get_mut(path) {
                    state.error = Some(TransferError::download(err.to_string()));
                }
            }
        }
    }

    fn snapshot(&self, entry: DiskEntry) -> RemoteItem {
        let mut item = if entry.is_dir {
            RemoteItem::directory(entry.path)
        } else if entry.materialized {
            RemoteItem::current(entry.path)
        } else {
            RemoteItem::remote_only(entry.path)
        };

        if let Some(state) = self.states.get(&item.path) {
            item.transfer = state.transfer;
            item.percent = Some(state.percent);
            item.error = state.error.clone();
            if state.transfer == TransferState::Downloading {
                item.download_status = DownloadStatus::NotDownloaded;
            }
        }
        item
    }

    fn lookup_all<'a>(&self, paths: impl Iterator<Item = &'a Path>) -> Vec<RemoteItem> {
        paths
            .filter_map(index::lookup)
            .map(|entry| self.snapshot(entry))
            .collect()
    }
}

impl CloudProvider for LocalProvider {
    fn is_identity_available(&self) -> bool {
        self.signed_in.load(Ordering::SeqCst)
    }

    fn container_root(&self, container_id: &str) -> Option<PathBuf> {
        if container_id.is_empty() || !self.is_identity_available() {
            return None;
        }
        Some(self.base_dir.join(container_id))
    }

    fn start_downloading(&self, path: &Path) -> StoreResult<()> {
        let entry = index::lookup(path).ok_or_else(|| StoreError::NotFound {
            path: path.to_path_buf(),
        })?;

        if !entry.materialized {
            self.states
                .insert(path.to_path_buf(), SyncState::new(TransferState::Downloading));
            debug!(path = %path.display(), "download requested");
        }
        self.notify(vec![path.to_path_buf()]);
        Ok(())
    }

    fn note_local_change(&self, path: &Path) {
        if path.is_file() {
            self.states
                .insert(path.to_path_buf(), SyncState::new(TransferState::Uploading));
            debug!(path = %path.display(), "upload queued");
        } else {
            self.states.remove(path);
            debug!(path = %path.display(), "removal noted");
        }
        self.notify(vec![path.to_path_buf()]);
    }

    fn query(&self, predicate: &PathPredicate) -> StoreResult<Vec<RemoteItem>> {
        let items = match predicate {
            PathPredicate::Exact(_) | PathPredicate::AnyOf(_) => {
                self.lookup_all(predicate.targets().into_iter())
            }
            PathPredicate::Prefix(root) => index::walk(root)
                .into_iter()
                .map(|entry| self.snapshot(entry))
                .collect(),
        };
        Ok(items)
    }

    fn subscribe(&self) -> broadcast::Receiver<IndexChange> {
        self.changes.subscribe()
    }
}
