//! The transfer orchestrator handle.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use stratus_core::resolver::{resolve_item, resolve_root};
use stratus_core::{CloudProvider, PathPredicate, StoreConfig, StoreError, StoreResult};
use stratus_watch::Expectation;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::channel::EventStream;
use crate::engine::{Command, Completion, Engine, EngineStats, TrackSpec};
use crate::fsops;
use crate::operation::{channel_name, DeleteRequest, DownloadRequest, OperationKind, UploadRequest};

/// Cloneable handle to a running store.
///
/// Each operation performs its synchronous filesystem step, then hands the
/// settlement tracking to the control loop and returns. Progress and the
/// terminal outcome arrive on the named [`EventStream`].
#[derive(Clone)]
pub struct CloudStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    provider: Arc<dyn CloudProvider>,
    container_id: RwLock<Option<String>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl CloudStore {
    /// Start the control loop for `provider`. Must be called inside a tokio
    /// runtime.
    pub fn spawn(provider: Arc<dyn CloudProvider>, config: &StoreConfig) -> Self {
        let commands = Engine::spawn(Arc::clone(&provider), config.channel_capacity);
        let container_id = config.container_id.clone().filter(|id| !id.is_empty());

        Self {
            inner: Arc::new(StoreInner {
                provider,
                container_id: RwLock::new(container_id),
                commands,
            }),
        }
    }

    /// Set the container all later operations resolve against.
    pub fn initialize(&self, container_id: &str) -> StoreResult<()> {
        if container_id.is_empty() {
            return Err(StoreError::invalid("containerId cannot be empty"));
        }
        let mut current = self
            .inner
            .container_id
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = Some(container_id.to_string());
        info!(container = container_id, "store initialized");
        Ok(())
    }

    /// Whether a remote identity is signed in.
    pub fn is_available(&self) -> bool {
        self.inner.provider.is_identity_available()
    }

    pub fn container_id(&self) -> Option<String> {
        self.inner
            .container_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register a named channel and return its subscriber side.
    pub async fn create_event_channel(&self, name: &str) -> StoreResult<EventStream> {
        let name = name.to_string();
        self.call(|reply| Command::CreateChannel { name, reply }).await?
    }

    /// Every path on disk below the directory, files and directories alike.
    pub async fn sub_files(&self, directory: Option<&str>) -> StoreResult<Vec<String>> {
        let root = self.root(directory)?;
        fsops::blocking(move || Ok(fsops::sub_paths(&root))).await
    }

    /// Files the provider knows below the directory, as of the initial scan.
    pub async fn list_files(&self, directory: Option<&str>) -> StoreResult<Vec<String>> {
        let root = self.root(directory)?;
        self.call(|reply| Command::ListOnce { root, reply }).await?
    }

    /// Stream the file listing on `channel` after every index change until
    /// the subscriber cancels.
    pub async fn watch_files(&self, directory: Option<&str>, channel: &str) -> StoreResult<()> {
        if channel.is_empty() {
            return Err(StoreError::invalid("watch requires an event channel"));
        }
        let channel = channel.to_string();
        let result = async {
            self.reserve_channel(&channel).await?;
            let root = self.root(directory)?;
            self.track(TrackSpec {
                kind: OperationKind::List,
                channel: Some(channel.clone()),
                predicate: PathPredicate::prefix(&root),
                expectation: Expectation::Listing { root },
                completion: Completion::Report,
            })
            .await
        }
        .await;
        self.release_on_error(Some(channel), result)
    }

    /// Copy a local file into the container.
    pub async fn upload(&self, request: UploadRequest) -> StoreResult<()> {
        let channel = channel_name(&request.channel).map(str::to_owned);
        let result = self.run_upload(request, channel.clone()).await;
        self.release_on_error(channel, result)
    }

    /// Materialize a container file and copy it to a local path.
    pub async fn download(&self, request: DownloadRequest) -> StoreResult<()> {
        let channel = channel_name(&request.channel).map(str::to_owned);
        let result = self.run_download(request, channel.clone()).await;
        self.release_on_error(channel, result)
    }

    /// Remove one or more container files.
    ///
    /// An empty name list succeeds at once whatever the channel name, and
    /// releases an idle channel without any event.
    pub async fn delete(&self, request: DeleteRequest) -> StoreResult<()> {
        let channel = channel_name(&request.channel).map(str::to_owned);
        let result = self.run_delete(request, channel.clone()).await;
        self.release_on_error(channel, result)
    }

    /// Release a channel from the subscriber side, as dropping its stream
    /// would. The attached operation is stopped and no further event is
    /// delivered. Unknown names are ignored.
    pub async fn cancel_event_channel(&self, name: &str) -> StoreResult<()> {
        if name.is_empty() {
            return Err(StoreError::invalid("event channel name cannot be empty"));
        }
        self.release(name.to_string());
        Ok(())
    }

    /// Live channel and operation counts.
    pub async fn stats(&self) -> StoreResult<EngineStats> {
        self.call(|reply| Command::Stats { reply }).await
    }

    async fn run_upload(&self, request: UploadRequest, channel: Option<String>) -> StoreResult<()> {
        if let Some(name) = &channel {
            self.reserve_channel(name).await?;
        }
        let root = self.root(request.directory.as_deref())?;
        let target = resolve_item(&root, &request.cloud_name)?;

        let source = request.local_path;
        let dest = target.clone();
        let bytes = fsops::blocking(move || fsops::replace_copy(&source, &dest)).await?;
        self.inner.provider.note_local_change(&target);
        info!(path = %target.display(), bytes, "upload started");

        if channel.is_none() {
            return Ok(());
        }
        self.track(TrackSpec {
            kind: OperationKind::Upload,
            channel,
            predicate: PathPredicate::exact(&target),
            expectation: Expectation::Uploaded,
            completion: Completion::Report,
        })
        .await
    }

    async fn run_download(&self, request: DownloadRequest, channel: Option<String>) -> StoreResult<()> {
        if request.local_path.as_os_str().is_empty() {
            return Err(StoreError::invalid("localFilePath cannot be empty"));
        }
        if let Some(name) = &channel {
            self.reserve_channel(name).await?;
        }
        let root = self.root(request.directory.as_deref())?;
        let target = resolve_item(&root, &request.cloud_name)?;

        self.inner.provider.start_downloading(&target)?;
        info!(path = %target.display(), to = %request.local_path.display(), "download started");

        // Tracking is attached even without a channel: the copy to the
        // requested location happens when the download settles.
        self.track(TrackSpec {
            kind: OperationKind::Download,
            channel,
            predicate: PathPredicate::exact(&target),
            expectation: Expectation::Downloaded,
            completion: Completion::MoveTo {
                from: target,
                to: request.local_path,
            },
        })
        .await
    }

    async fn run_delete(&self, request: DeleteRequest, channel: Option<String>) -> StoreResult<()> {
        let root = self.root(request.directory.as_deref())?;
        if request.cloud_names.is_empty() {
            // Whatever the channel name, nothing is reported on it. A channel
            // busy with another operation is left alone.
            if let Some(name) = channel {
                let _ = self.inner.commands.send(Command::ReleaseIdle { name });
            }
            return Ok(());
        }

        if let Some(name) = &channel {
            self.reserve_channel(name).await?;
        }
        let targets = request
            .cloud_names
            .iter()
            .map(|name| resolve_item(&root, name))
            .collect::<StoreResult<Vec<PathBuf>>>()?;

        let targets = fsops::blocking(move || {
            for target in &targets {
                fsops::remove_entry(target)?;
            }
            Ok(targets)
        })
        .await?;
        for target in &targets {
            self.inner.provider.note_local_change(target);
        }
        info!(count = targets.len(), "entries removed");

        if channel.is_none() {
            return Ok(());
        }
        let predicate = match targets.as_slice() {
            [single] => PathPredicate::exact(single),
            _ => PathPredicate::any_of(targets),
        };
        self.track(TrackSpec {
            kind: OperationKind::Delete,
            channel,
            predicate,
            expectation: Expectation::Removed,
            completion: Completion::Report,
        })
        .await
    }

    fn root(&self, directory: Option<&str>) -> StoreResult<PathBuf> {
        let container_id = self.container_id().ok_or(StoreError::NotInitialized)?;
        resolve_root(self.inner.provider.as_ref(), &container_id, directory)
    }

    /// Claim the channel before any filesystem effect. A second operation
    /// on the same channel is refused here rather than after its copy.
    async fn reserve_channel(&self, name: &str) -> StoreResult<()> {
        let name = name.to_string();
        self.call(|reply| Command::ReserveChannel { name, reply }).await?
    }

    async fn track(&self, tracking: TrackSpec) -> StoreResult<()> {
        self.call(|reply| Command::Track { tracking, reply }).await?
    }

    fn release(&self, name: String) {
        let _ = self.inner.commands.send(Command::Release { name });
    }

    /// A failed operation releases its channel, closing the stream without
    /// events. Channel lookup failures leave the channel alone: it is
    /// either missing or owned by another operation.
    fn release_on_error(&self, channel: Option<String>, result: StoreResult<()>) -> StoreResult<()> {
        if let (Err(err), Some(name)) = (&result, channel) {
            if !matches!(
                err,
                StoreError::ChannelInUse { .. } | StoreError::UnknownChannel { .. }
            ) {
                warn!(channel = %name, error = %err, "operation failed, releasing channel");
                self.release(name);
            }
        }
        result
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> StoreResult<T> {
        let (reply, response) = oneshot::channel();
        self.inner
            .commands
            .send(command(reply))
            .map_err(|_| StoreError::Shutdown)?;
        response.await.map_err(|_| StoreError::Shutdown)
    }
}

impl std::fmt::Debug for CloudStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudStore")
            .field("container_id", &self.container_id())
            .finish()
    }
}
