//! Ticks delivered by a running watch query.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use stratus_core::{RemoteItem, StoreResult};
use tokio::sync::mpsc;

static NEXT_WATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a watch query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatchId(pub u64);

impl WatchId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        Self(NEXT_WATCH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

/// Why a tick was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchPhase {
    /// The initial scan completed.
    GatheringFinished,
    /// The matched set may have changed since the previous tick.
    IndexUpdated,
}

/// The full matched set at one point in time.
#[derive(Debug)]
pub struct Tick {
    pub watch: WatchId,
    pub phase: WatchPhase,
    /// Current items, or the error the query failed with.
    pub items: StoreResult<Vec<RemoteItem>>,
}

impl Tick {
    /// Whether this is the first tick of its watch.
    pub fn is_initial(&self) -> bool {
        self.phase == WatchPhase::GatheringFinished
    }
}

/// Destination of ticks. All watches of one engine share a single sink,
/// which the consumer drains from one task.
pub trait TickSink: Send + Sync + 'static {
    /// Deliver a tick. Returns false once the consumer is gone.
    fn deliver(&self, tick: Tick) -> bool;
}

impl<T> TickSink for mpsc::UnboundedSender<T>
where
    T: From<Tick> + Send + 'static,
{
    fn deliver(&self, tick: Tick) -> bool {
        self.send(T::from(tick)).is_ok()
    }
}
