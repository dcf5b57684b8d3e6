use std::fs;
use std::sync::Arc;
use std::time::Duration;

use stratus_core::{CloudProvider, PathPredicate, TransferError};
use stratus_local::LocalProvider;
use stratus_watch::{Expectation, Interpreter, Terminal, Tick, WatchPhase, WatchQuery};
use tempfile::TempDir;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

async fn next_tick(rx: &mut mpsc::UnboundedReceiver<Tick>) -> Tick {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("tick timed out")
        .expect("tick channel closed")
}

#[tokio::test]
async fn test_initial_tick_then_updates() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(LocalProvider::new(dir.path()));
    let path = dir.path().join("a.txt");
    fs::write(&path, b"a").unwrap();
    provider.note_local_change(&path);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut query = WatchQuery::start(provider.clone(), PathPredicate::exact(&path), tx);

    let tick = next_tick(&mut rx).await;
    assert_eq!(tick.watch, query.id());
    assert_eq!(tick.phase, WatchPhase::GatheringFinished);
    assert!(tick.items.as_ref().unwrap()[0].is_uploading());

    provider.step(100.0);
    let tick = next_tick(&mut rx).await;
    assert_eq!(tick.phase, WatchPhase::IndexUpdated);
    assert!(!tick.items.as_ref().unwrap()[0].is_uploading());

    query.stop();
    assert!(query.is_stopped());
}

#[tokio::test]
async fn test_no_ticks_after_stop() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(LocalProvider::new(dir.path()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut query = WatchQuery::start(provider.clone(), PathPredicate::prefix(dir.path()), tx);
    next_tick(&mut rx).await;

    query.stop();
    query.stop();

    fs::write(dir.path().join("late.txt"), b"late").unwrap();
    provider.notify(vec![dir.path().join("late.txt")]);

    let silent = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(matches!(silent, Err(_) | Ok(None)));
}

#[tokio::test]
async fn test_irrelevant_changes_are_filtered() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(LocalProvider::new(dir.path()));
    let watched = dir.path().join("watched.txt");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _query = WatchQuery::start(provider.clone(), PathPredicate::exact(&watched), tx);
    next_tick(&mut rx).await;

    provider.notify(vec![dir.path().join("other.txt")]);
    let silent = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(silent.is_err());

    provider.notify(vec![watched.clone()]);
    let tick = next_tick(&mut rx).await;
    assert!(tick.items.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_failure_interpreted_as_terminal() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(LocalProvider::new(dir.path()));
    let path = dir.path().join("b.txt");
    fs::write(&path, b"b").unwrap();
    provider.note_local_change(&path);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _query = WatchQuery::start(provider.clone(), PathPredicate::exact(&path), tx);
    let mut interpreter = Interpreter::new(Expectation::Uploaded);

    let first = interpreter.interpret(&next_tick(&mut rx).await);
    assert_eq!(first.progress, Some(0.0));

    provider.fail(&path, TransferError::upload("quota"));
    let out = interpreter.interpret(&next_tick(&mut rx).await);
    assert_eq!(out.terminal, Some(Terminal::Failed("quota".into())));
}

#[tokio::test]
async fn test_removal_of_absent_path_settles_on_gathering() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(LocalProvider::new(dir.path()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _query = WatchQuery::start(
        provider,
        PathPredicate::any_of([dir.path().join("x"), dir.path().join("y")]),
        tx,
    );
    let mut interpreter = Interpreter::new(Expectation::Removed);

    let tick = next_tick(&mut rx).await;
    assert!(tick.is_initial());
    assert_eq!(interpreter.interpret(&tick).terminal, Some(Terminal::Settled));
}

#[tokio::test]
async fn test_dropping_query_stops_delivery() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(LocalProvider::new(dir.path()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let query = WatchQuery::start(provider.clone(), PathPredicate::prefix(dir.path()), tx);
    next_tick(&mut rx).await;
    drop(query);

    provider.notify(Vec::new());
    // The only sender lived in the aborted task, so the channel closes.
    let closed = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
    assert!(closed.is_none());
}
