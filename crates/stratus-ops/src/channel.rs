//! Event channels: named, single-subscriber streams of operation events.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use stratus_core::{ErrorCode, StoreError, StoreResult};
use stratus_watch::WatchId;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::engine::Notice;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Distinguishes successive channels that reuse a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ChannelId(u64);

impl ChannelId {
    fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Error carried by a stream `Error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorPayload {
    /// An error of the given category with its fixed message.
    pub fn new(code: ErrorCode, details: impl Into<String>) -> Self {
        Self {
            code,
            message: fixed_message(code).to_string(),
            details: Some(details.into()),
        }
    }

    /// A native failure with the original error text as details.
    pub fn native(details: impl Into<String>) -> Self {
        Self::new(ErrorCode::Native, details)
    }
}

impl From<&StoreError> for ErrorPayload {
    fn from(err: &StoreError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Message callers see for each error category.
pub fn fixed_message(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::Argument => "Invalid Arguments",
        ErrorCode::Container => {
            "Invalid containerId, or user is not signed in, or user disabled iCloud permission"
        }
        ErrorCode::Native => "Native Code Error",
    }
}

/// One event delivered on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum StreamEvent {
    /// Transfer progress, 0 to 100.
    Progress(f64),
    /// Current file listing, relative to the listed directory.
    Files(Vec<String>),
    /// Terminal failure.
    Error(ErrorPayload),
    /// Terminal success.
    End,
}

impl StreamEvent {
    /// Whether no event can follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::End)
    }
}

/// Subscriber side of an event channel.
///
/// Dropping the stream, or calling [`EventStream::cancel`], cancels the
/// operation attached to the channel and stops its watch.
pub struct EventStream {
    name: String,
    id: ChannelId,
    events: ReceiverStream<StreamEvent>,
    notices: Option<mpsc::UnboundedSender<Notice>>,
}

impl EventStream {
    /// Name the channel was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next event. `None` once the channel is released.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.next().await
    }

    /// Cancel the subscription. No event is delivered afterwards.
    pub fn cancel(mut self) {
        self.send_cancel();
    }

    fn send_cancel(&mut self) {
        if let Some(notices) = self.notices.take() {
            let _ = notices.send(Notice::Cancel {
                name: self.name.clone(),
                id: self.id,
            });
        }
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.send_cancel();
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").field("name", &self.name).finish()
    }
}

/// What a channel is currently bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelState {
    Idle,
    /// Claimed by an operation still running its synchronous step.
    Reserved,
    /// An operation with this watch is reporting on the channel.
    Tracking(WatchId),
}

/// Registry entry for one active channel.
#[derive(Debug)]
pub(crate) struct ChannelEntry {
    pub id: ChannelId,
    sink: mpsc::Sender<StreamEvent>,
    pub state: ChannelState,
}

impl ChannelEntry {
    /// Watch of the operation reporting on this channel, if any.
    pub fn watch(&self) -> Option<WatchId> {
        match self.state {
            ChannelState::Tracking(watch) => Some(watch),
            ChannelState::Idle | ChannelState::Reserved => None,
        }
    }
}

/// Process-wide map from channel name to its live subscriber.
///
/// Only the control loop touches the registry, so it needs no lock.
#[derive(Debug)]
pub(crate) struct EventChannels {
    entries: HashMap<String, ChannelEntry>,
    capacity: usize,
}

impl EventChannels {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a channel. Active names are rejected rather than replaced.
    pub fn create(
        &mut self,
        name: &str,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> StoreResult<EventStream> {
        if name.is_empty() {
            return Err(StoreError::invalid("event channel name cannot be empty"));
        }
        if self.entries.contains_key(name) {
            return Err(StoreError::ChannelInUse {
                name: name.to_string(),
            });
        }

        let (sink, rx) = mpsc::channel(self.capacity);
        let id = ChannelId::next();
        self.entries.insert(
            name.to_string(),
            ChannelEntry {
                id,
                sink,
                state: ChannelState::Idle,
            },
        );
        debug!(channel = name, "event channel created");

        Ok(EventStream {
            name: name.to_string(),
            id,
            events: ReceiverStream::new(rx),
            notices: Some(notices),
        })
    }

    pub fn get(&self, name: &str) -> Option<&ChannelEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Claim an idle channel for one operation. The claim holds until the
    /// operation attaches its watch or the channel is released.
    pub fn reserve(&mut self, name: &str) -> StoreResult<()> {
        let Some(entry) = self.entries.get_mut(name) else {
            return Err(StoreError::UnknownChannel {
                name: name.to_string(),
            });
        };
        if entry.state != ChannelState::Idle {
            return Err(StoreError::ChannelInUse {
                name: name.to_string(),
            });
        }
        entry.state = ChannelState::Reserved;
        Ok(())
    }

    /// Bind an operation's watch to a channel. False if the name is unknown.
    pub fn attach(&mut self, name: &str, watch: WatchId) -> bool {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.state = ChannelState::Tracking(watch);
                true
            }
            None => false,
        }
    }

    /// Deliver a non-terminal event. Dropped if the subscriber is behind,
    /// since a later progress or listing event supersedes it.
    pub fn emit(&self, name: &str, event: StreamEvent) {
        let Some(entry) = self.entries.get(name) else {
            debug!(channel = name, "emit on unknown channel ignored");
            return;
        };
        match entry.sink.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(channel = name, "subscriber is behind, event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(channel = name, "subscriber gone, event dropped");
            }
        }
    }

    /// Deliver a terminal event and release the channel.
    pub fn finish(&mut self, name: &str, event: StreamEvent) -> Option<ChannelEntry> {
        let entry = self.entries.remove(name)?;
        match entry.sink.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                // Keep exactly-once delivery without stalling the control loop.
                let sink = entry.sink.clone();
                tokio::spawn(async move {
                    let _ = sink.send(event).await;
                });
            }
        }
        debug!(channel = name, "event channel finished");
        Some(entry)
    }

    /// Evict a channel without delivering anything. With `id`, only the
    /// channel instance carrying that id is removed.
    pub fn remove(&mut self, name: &str, id: Option<ChannelId>) -> Option<ChannelEntry> {
        match (self.entries.get(name), id) {
            (None, _) => None,
            (Some(entry), Some(id)) if entry.id != id => None,
            _ => {
                debug!(channel = name, "event channel removed");
                self.entries.remove(name)
            }
        }
    }
}
