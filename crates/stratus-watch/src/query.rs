//! Standing, predicate-scoped observations over a provider's index.

use std::sync::Arc;

use stratus_core::{CloudProvider, IndexChange, PathPredicate, RemoteItem, StoreError, StoreResult};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::tick::{Tick, TickSink, WatchId, WatchPhase};

/// A running watch. Ticks stop once [`WatchQuery::stop`] is called or the
/// handle is dropped.
#[derive(Debug)]
pub struct WatchQuery {
    id: WatchId,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchQuery {
    /// Start observing items matching `predicate`.
    ///
    /// The first tick is delivered once the initial scan finishes, then one
    /// tick per observed index change. Must be called inside a tokio runtime.
    pub fn start<S: TickSink>(
        provider: Arc<dyn CloudProvider>,
        predicate: PathPredicate,
        sink: S,
    ) -> Self {
        let id = WatchId::next();
        let cancel = CancellationToken::new();

        // Subscribe before scanning so no change between the two is lost.
        let changes = provider.subscribe();
        let task = tokio::spawn(watch_loop(
            id,
            provider,
            predicate.clone(),
            changes,
            sink,
            cancel.clone(),
        ));

        debug!(%id, %predicate, "watch started");
        Self {
            id,
            cancel,
            task: Some(task),
        }
    }

    /// Identifier carried by this watch's ticks.
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Whether the watch was stopped.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Detach the observer and halt the scan. Safe to call more than once.
    pub fn stop(&mut self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            debug!(id = %self.id, "watch stopped");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WatchQuery {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn watch_loop<S: TickSink>(
    id: WatchId,
    provider: Arc<dyn CloudProvider>,
    predicate: PathPredicate,
    mut changes: broadcast::Receiver<IndexChange>,
    sink: S,
    cancel: CancellationToken,
) {
    let items = run_query(&provider, &predicate).await;
    if cancel.is_cancelled()
        || !sink.deliver(Tick {
            watch: id,
            phase: WatchPhase::GatheringFinished,
            items,
        })
    {
        return;
    }

    loop {
        let relevant = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            change = changes.recv() => match change {
                Ok(change) => is_relevant(&predicate, &change),
                Err(RecvError::Lagged(skipped)) => {
                    trace!(%id, skipped, "change feed lagged, re-querying");
                    true
                }
                Err(RecvError::Closed) => break,
            },
        };

        // Coalesce a burst of changes into one query.
        let relevant = relevant | drain_pending(&predicate, &mut changes);
        if !relevant {
            continue;
        }

        let items = run_query(&provider, &predicate).await;
        if cancel.is_cancelled() {
            break;
        }
        let tick = Tick {
            watch: id,
            phase: WatchPhase::IndexUpdated,
            items,
        };
        if !sink.deliver(tick) {
            break;
        }
    }

    trace!(%id, "watch loop exited");
}

fn drain_pending(predicate: &PathPredicate, changes: &mut broadcast::Receiver<IndexChange>) -> bool {
    let mut relevant = false;
    loop {
        match changes.try_recv() {
            Ok(change) => relevant |= is_relevant(predicate, &change),
            Err(TryRecvError::Lagged(_)) => relevant = true,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    relevant
}

/// A change matters when it names no paths or touches a matched path.
fn is_relevant(predicate: &PathPredicate, change: &IndexChange) -> bool {
    change.paths.is_empty() || change.paths.iter().any(|p| predicate.matches(p))
}

async fn run_query(
    provider: &Arc<dyn CloudProvider>,
    predicate: &PathPredicate,
) -> StoreResult<Vec<RemoteItem>> {
    let provider = Arc::clone(provider);
    let predicate = predicate.clone();
    tokio::task::spawn_blocking(move || provider.query(&predicate))
        .await
        .unwrap_or_else(|e| Err(StoreError::provider(format!("Query task failed: {e}"))))
}
