//! Background task that advances simulated transfers on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::LocalProvider;

/// Handle to a running transfer driver. Stops the driver when dropped.
pub struct SyncDriver {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SyncDriver {
    /// Start stepping `provider` by `step` percent every `interval`.
    pub fn spawn(provider: Arc<LocalProvider>, interval: Duration, step: f64) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let moved = provider.step(step);
                        if moved > 0 {
                            debug!(moved, "sync driver stepped transfers");
                        }
                    }
                }
            }
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Stop the driver and wait for its task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncDriver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_driver_completes_uploads() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(LocalProvider::new(dir.path()));
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"a").unwrap();
        stratus_core::CloudProvider::note_local_change(provider.as_ref(), &path);

        let driver = SyncDriver::spawn(provider.clone(), Duration::from_millis(5), 50.0);
        for _ in 0..200 {
            if provider.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        driver.shutdown().await;

        assert_eq!(provider.in_flight(), 0);
    }
}
