use std::fs;
use std::time::Duration;

use stratus_core::{CloudProvider, PathPredicate, TransferState};
use stratus_local::LocalProvider;
use tempfile::TempDir;

#[test]
fn test_prefix_query_mixes_local_and_remote_only() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("iCloud.app");
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(root.join("docs").join("a.txt"), b"a").unwrap();
    fs::write(root.join("b.txt"), b"b").unwrap();

    let provider = LocalProvider::new(dir.path());
    provider.evict(&root.join("b.txt")).unwrap();

    let items = provider.query(&PathPredicate::prefix(&root)).unwrap();
    let summary: Vec<_> = items
        .iter()
        .map(|i| (i.relative_to(&root).unwrap(), i.is_dir, i.is_current()))
        .collect();

    assert_eq!(
        summary,
        vec![
            ("b.txt".to_string(), false, false),
            ("docs".to_string(), true, true),
            ("docs/a.txt".to_string(), false, true),
        ]
    );
}

#[test]
fn test_any_of_query_skips_absent_paths() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a"), b"a").unwrap();

    let provider = LocalProvider::new(dir.path());
    let items = provider
        .query(&PathPredicate::any_of([dir.path().join("a"), dir.path().join("b")]))
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].path, dir.path().join("a"));
}

#[test]
fn test_download_state_reported_while_in_flight() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.bin");
    fs::write(&path, vec![7u8; 1024]).unwrap();

    let provider = LocalProvider::new(dir.path());
    provider.evict(&path).unwrap();
    provider.start_downloading(&path).unwrap();
    provider.step(30.0);

    let items = provider.query(&PathPredicate::exact(&path)).unwrap();
    assert_eq!(items[0].transfer, TransferState::Downloading);
    assert_eq!(items[0].percent, Some(30.0));
    assert!(!items[0].is_current());
}

#[tokio::test]
async fn test_changes_are_broadcast() {
    let dir = TempDir::new().unwrap();
    let provider = LocalProvider::new(dir.path());
    let mut changes = provider.subscribe();

    let path = dir.path().join("n.txt");
    fs::write(&path, b"n").unwrap();
    provider.note_local_change(&path);

    let change = tokio::time::timeout(Duration::from_secs(1), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(change.paths, vec![path]);
}
