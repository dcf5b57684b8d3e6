use std::path::{Path, PathBuf};

use stratus_core::resolver::{resolve_item, resolve_root};
use stratus_core::{
    CloudProvider, ErrorCode, IndexChange, PathPredicate, RemoteItem, StoreConfig, StoreError,
    StoreResult, TransferError, TransferState,
};
use tempfile::TempDir;
use tokio::sync::broadcast;

struct FixedProvider {
    root: Option<PathBuf>,
    changes: broadcast::Sender<IndexChange>,
}

impl FixedProvider {
    fn new(root: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(4);
        Self { root, changes }
    }
}

impl CloudProvider for FixedProvider {
    fn is_identity_available(&self) -> bool {
        self.root.is_some()
    }

    fn container_root(&self, container_id: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|r| r.join(container_id))
    }

    fn start_downloading(&self, _path: &Path) -> StoreResult<()> {
        Ok(())
    }

    fn note_local_change(&self, _path: &Path) {}

    fn query(&self, _predicate: &PathPredicate) -> StoreResult<Vec<RemoteItem>> {
        Ok(Vec::new())
    }

    fn subscribe(&self) -> broadcast::Receiver<IndexChange> {
        self.changes.subscribe()
    }
}

#[test]
fn test_resolve_root_with_and_without_directory() {
    let provider = FixedProvider::new(Some(PathBuf::from("/base")));

    let root = resolve_root(&provider, "iCloud.app", None).unwrap();
    assert_eq!(root, PathBuf::from("/base/iCloud.app"));

    let root = resolve_root(&provider, "iCloud.app", Some("")).unwrap();
    assert_eq!(root, PathBuf::from("/base/iCloud.app"));

    let root = resolve_root(&provider, "iCloud.app", Some("Documents")).unwrap();
    assert_eq!(root, PathBuf::from("/base/iCloud.app/Documents"));
}

#[test]
fn test_resolve_root_unavailable_container() {
    let provider = FixedProvider::new(None);
    let err = resolve_root(&provider, "iCloud.app", None).unwrap_err();
    assert!(matches!(err, StoreError::ContainerUnavailable));
    assert_eq!(err.code(), ErrorCode::Container);
}

#[test]
fn test_resolve_root_rejects_parent_directory() {
    let provider = FixedProvider::new(Some(PathBuf::from("/base")));
    let err = resolve_root(&provider, "iCloud.app", Some("../other")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Argument);
}

#[test]
fn test_resolve_item_nested_name() {
    let item = resolve_item(Path::new("/base/c"), "notes/today.md").unwrap();
    assert_eq!(item, PathBuf::from("/base/c/notes/today.md"));
}

#[test]
fn test_remote_item_builders() {
    let item = RemoteItem::remote_only("/c/a.bin")
        .with_transfer(TransferState::Downloading, Some(40.0))
        .with_error(TransferError::download("offline"));

    assert!(item.is_downloading());
    assert!(!item.is_current());
    assert_eq!(item.percent, Some(40.0));
    assert_eq!(item.download_error().unwrap().message, "offline");
    assert!(item.error.as_ref().unwrap().to_string().contains("download failed"));
}

#[test]
fn test_config_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "container_id = \"iCloud.file\"\nchannel_capacity = 4\nsigned_in = false\n",
    )
    .unwrap();

    let config = StoreConfig::load(&path).unwrap();
    assert_eq!(config.container_id.as_deref(), Some("iCloud.file"));
    assert_eq!(config.channel_capacity, 4);
    assert!(!config.signed_in);
}

#[test]
fn test_config_load_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "driver_step = 0.0\n").unwrap();

    assert!(StoreConfig::load(&path).is_err());
}

#[test]
fn test_config_load_or_default_missing_file() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::load_or_default(&dir.path().join("missing.toml")).unwrap();
    assert!(config.container_id.is_none());
    assert_eq!(config.channel_capacity, stratus_core::DEFAULT_CHANNEL_CAPACITY);
}
