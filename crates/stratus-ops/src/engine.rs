//! The control loop: a single task owning the channel registry and every
//! tracked operation.
//!
//! Ticks from all watches, subscriber cancellations, and requests from
//! [`crate::CloudStore`] handles are serialized here, so no two handlers
//! ever run concurrently and the registry needs no lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use stratus_core::{CloudProvider, PathPredicate, StoreError, StoreResult};
use stratus_watch::{Expectation, Interpretation, Interpreter, Terminal, Tick, WatchId, WatchQuery};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::channel::{ChannelId, ChannelState, ErrorPayload, EventChannels, EventStream, StreamEvent};
use crate::fsops;
use crate::operation::OperationKind;

/// Requests sent by store handles.
#[derive(Debug)]
pub(crate) enum Command {
    CreateChannel {
        name: String,
        reply: oneshot::Sender<StoreResult<EventStream>>,
    },
    /// Claim an existing, idle channel for the operation about to run.
    ReserveChannel {
        name: String,
        reply: oneshot::Sender<StoreResult<()>>,
    },
    Track {
        tracking: TrackSpec,
        reply: oneshot::Sender<StoreResult<()>>,
    },
    ListOnce {
        root: PathBuf,
        reply: oneshot::Sender<StoreResult<Vec<String>>>,
    },
    /// Release a channel after its operation failed synchronously, or on
    /// request of the subscriber.
    Release { name: String },
    /// Release a channel only if no operation holds it.
    ReleaseIdle { name: String },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
}

/// Notifications produced inside the engine: watch ticks, subscriber
/// cancellations, and finished download copies.
#[derive(Debug)]
pub(crate) enum Notice {
    Tick(Tick),
    Cancel {
        name: String,
        id: ChannelId,
    },
    Placed {
        watch: WatchId,
        kind: OperationKind,
        channel: Option<String>,
        to: PathBuf,
        result: StoreResult<u64>,
    },
}

impl From<Tick> for Notice {
    fn from(tick: Tick) -> Self {
        Self::Tick(tick)
    }
}

/// What to do once a tracked operation settles.
#[derive(Debug)]
pub(crate) enum Completion {
    /// Report the terminal event on the channel.
    Report,
    /// Copy the materialized file to its requested location first.
    MoveTo { from: PathBuf, to: PathBuf },
    /// Answer a one-shot listing with the first tick.
    Reply(oneshot::Sender<StoreResult<Vec<String>>>),
}

/// An operation whose settlement should be tracked.
#[derive(Debug)]
pub(crate) struct TrackSpec {
    pub kind: OperationKind,
    pub channel: Option<String>,
    pub predicate: PathPredicate,
    pub expectation: Expectation,
    pub completion: Completion,
}

/// Counts of live engine resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Registered event channels.
    pub channels: usize,
    /// Operations with a running watch.
    pub operations: usize,
}

/// The operation handle: one per tracked operation, owning its watch.
struct Operation {
    kind: OperationKind,
    channel: Option<String>,
    watch: WatchQuery,
    interpreter: Interpreter,
    completion: Completion,
}

pub(crate) struct Engine {
    provider: Arc<dyn CloudProvider>,
    channels: EventChannels,
    operations: HashMap<WatchId, Operation>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl Engine {
    /// Start the control loop. It runs until every command sender is gone
    /// and no channel or operation remains.
    pub fn spawn(
        provider: Arc<dyn CloudProvider>,
        channel_capacity: usize,
    ) -> mpsc::UnboundedSender<Command> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        let engine = Self {
            provider,
            channels: EventChannels::new(channel_capacity),
            operations: HashMap::new(),
            notices: notices_tx,
        };
        tokio::spawn(engine.run(commands_rx, notices_rx));

        commands_tx
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut notices: mpsc::UnboundedReceiver<Notice>,
    ) {
        let mut accepting = true;
        loop {
            if !accepting && self.channels.is_empty() && self.operations.is_empty() {
                break;
            }

            tokio::select! {
                command = commands.recv(), if accepting => match command {
                    Some(command) => self.handle_command(command),
                    None => accepting = false,
                },
                Some(notice) = notices.recv() => match notice {
                    Notice::Tick(tick) => self.on_tick(tick),
                    Notice::Cancel { name, id } => self.release(&name, Some(id)),
                    Notice::Placed { watch, kind, channel, to, result } => {
                        self.on_placed(watch, kind, channel, to, result)
                    }
                },
            }
        }
        info!("control loop stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::CreateChannel { name, reply } => {
                let result = self.channels.create(&name, self.notices.clone());
                // A dropped reply drops the stream, which cancels it again.
                let _ = reply.send(result);
            }
            Command::ReserveChannel { name, reply } => {
                let _ = reply.send(self.channels.reserve(&name));
            }
            Command::Track { tracking, reply } => {
                let _ = reply.send(self.track(tracking));
            }
            Command::ListOnce { root, reply } => {
                let tracking = TrackSpec {
                    kind: OperationKind::List,
                    channel: None,
                    predicate: PathPredicate::prefix(&root),
                    expectation: Expectation::Listing { root },
                    completion: Completion::Reply(reply),
                };
                // Without a channel tracking cannot be refused.
                let _ = self.track(tracking);
            }
            Command::Release { name } => self.release(&name, None),
            Command::ReleaseIdle { name } => {
                let idle = self
                    .channels
                    .get(&name)
                    .is_some_and(|entry| entry.state == ChannelState::Idle);
                if idle {
                    self.release(&name, None);
                }
            }
            Command::Stats { reply } => {
                let _ = reply.send(EngineStats {
                    channels: self.channels.len(),
                    operations: self.operations.len(),
                });
            }
        }
    }

    fn track(&mut self, tracking: TrackSpec) -> StoreResult<()> {
        if let Some(name) = &tracking.channel {
            match self.channels.get(name).map(|entry| entry.state) {
                None => {
                    // The subscriber cancelled while the synchronous step ran.
                    info!(channel = %name, kind = %tracking.kind, "channel gone before tracking, skipped");
                    return Ok(());
                }
                Some(ChannelState::Tracking(_)) => {
                    return Err(StoreError::ChannelInUse { name: name.clone() });
                }
                Some(ChannelState::Idle | ChannelState::Reserved) => {}
            }
        }

        let watch = WatchQuery::start(
            Arc::clone(&self.provider),
            tracking.predicate,
            self.notices.clone(),
        );
        let id = watch.id();
        if let Some(name) = &tracking.channel {
            self.channels.attach(name, id);
        }

        info!(watch = %id, kind = %tracking.kind, channel = ?tracking.channel, "tracking attached");
        self.operations.insert(
            id,
            Operation {
                kind: tracking.kind,
                channel: tracking.channel,
                watch,
                interpreter: Interpreter::new(tracking.expectation),
                completion: tracking.completion,
            },
        );
        Ok(())
    }

    /// Evict a channel, stopping the operation attached to it first.
    fn release(&mut self, name: &str, id: Option<ChannelId>) {
        let Some(entry) = self.channels.remove(name, id) else {
            debug!(channel = name, "release of inactive channel ignored");
            return;
        };

        if let Some(watch) = entry.watch() {
            if let Some(mut op) = self.operations.remove(&watch) {
                op.watch.stop();
                info!(channel = name, kind = %op.kind, "operation cancelled");
            }
        }
    }

    fn on_tick(&mut self, tick: Tick) {
        let Some(op) = self.operations.get_mut(&tick.watch) else {
            trace!(watch = %tick.watch, "tick for stopped watch dropped");
            return;
        };

        let out = op.interpreter.interpret(&tick);
        debug!(
            watch = %tick.watch,
            kind = %op.kind,
            phase = ?tick.phase,
            progress = ?out.progress,
            terminal = ?out.terminal,
            "tick"
        );

        if matches!(op.completion, Completion::Reply(_)) {
            self.answer_listing(tick.watch, out);
            return;
        }

        if let Some(name) = op.channel.as_deref() {
            if let Some(files) = out.files {
                self.channels.emit(name, StreamEvent::Files(files));
            }
            if let Some(percent) = out.progress {
                self.channels.emit(name, StreamEvent::Progress(percent));
            }
        }

        if let Some(terminal) = out.terminal {
            self.complete(tick.watch, terminal);
        }
    }

    fn answer_listing(&mut self, watch: WatchId, out: Interpretation) {
        let Some(mut op) = self.operations.remove(&watch) else {
            return;
        };
        op.watch.stop();

        let result = match out.terminal {
            Some(Terminal::Failed(message)) => Err(StoreError::provider(message)),
            _ => Ok(out.files.unwrap_or_default()),
        };
        if let Completion::Reply(reply) = op.completion {
            let _ = reply.send(result);
        }
    }

    fn complete(&mut self, watch: WatchId, terminal: Terminal) {
        let Some(mut op) = self.operations.remove(&watch) else {
            return;
        };
        op.watch.stop();

        match (terminal, op.completion) {
            (Terminal::Failed(message), _) => {
                warn!(kind = %op.kind, %message, "operation failed");
                let event = StreamEvent::Error(ErrorPayload::native(message));
                self.settle(watch, op.kind, op.channel.as_deref(), event);
            }
            (Terminal::Settled, Completion::MoveTo { from, to }) => {
                self.place(watch, op.kind, op.channel, from, to);
            }
            (Terminal::Settled, _) => {
                self.settle(watch, op.kind, op.channel.as_deref(), StreamEvent::End);
            }
        }
    }

    /// Copy a settled download off the loop. The channel stays bound to
    /// `watch` until [`Notice::Placed`] comes back.
    fn place(
        &self,
        watch: WatchId,
        kind: OperationKind,
        channel: Option<String>,
        from: PathBuf,
        to: PathBuf,
    ) {
        let notices = self.notices.clone();
        tokio::spawn(async move {
            let result = move_into_place(from, to.clone()).await;
            let _ = notices.send(Notice::Placed {
                watch,
                kind,
                channel,
                to,
                result,
            });
        });
    }

    fn on_placed(
        &mut self,
        watch: WatchId,
        kind: OperationKind,
        channel: Option<String>,
        to: PathBuf,
        result: StoreResult<u64>,
    ) {
        let event = match result {
            Ok(bytes) => {
                info!(to = %to.display(), bytes, "download placed");
                StreamEvent::End
            }
            Err(err) => {
                warn!(to = %to.display(), error = %err, "download move failed");
                StreamEvent::Error(ErrorPayload::from(&err))
            }
        };
        self.settle(watch, kind, channel.as_deref(), event);
    }

    /// Report the terminal event, unless the channel was released or
    /// rebound in the meantime.
    fn settle(
        &mut self,
        watch: WatchId,
        kind: OperationKind,
        channel: Option<&str>,
        event: StreamEvent,
    ) {
        let failed = matches!(event, StreamEvent::Error(_));
        info!(%kind, ?channel, failed, "operation settled");
        if let Some(name) = channel {
            let owned = self.channels.get(name).and_then(|entry| entry.watch()) == Some(watch);
            if owned {
                self.channels.finish(name, event);
            }
        }
    }
}

async fn move_into_place(from: PathBuf, to: PathBuf) -> StoreResult<u64> {
    fsops::blocking(move || fsops::replace_copy(&from, &to)).await
}
