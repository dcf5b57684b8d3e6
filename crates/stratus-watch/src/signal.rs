//! Interpretation of ticks into progress and terminal signals.

use std::path::PathBuf;

use stratus_core::RemoteItem;

use crate::tick::Tick;

/// What counts as "settled" for a watched operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// The item finished uploading.
    Uploaded,
    /// The item is fully materialized locally.
    Downloaded,
    /// None of the matched paths remain in the index.
    Removed,
    /// Never settles; reports the file listing below `root`.
    Listing { root: PathBuf },
}

/// Terminal outcome of a watched operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    Settled,
    Failed(String),
}

/// Signals derived from one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interpretation {
    /// New progress value, only when it advanced.
    pub progress: Option<f64>,
    /// File listing, for listing watches.
    pub files: Option<Vec<String>>,
    /// Set when the operation has finished.
    pub terminal: Option<Terminal>,
}

impl Interpretation {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            terminal: Some(Terminal::Failed(message.into())),
            ..Self::default()
        }
    }

    fn settled(progress: Option<f64>) -> Self {
        Self {
            progress,
            terminal: Some(Terminal::Settled),
            ..Self::default()
        }
    }

    /// Whether the tick produced nothing to report.
    pub fn is_empty(&self) -> bool {
        self.progress.is_none() && self.files.is_none() && self.terminal.is_none()
    }
}

/// Keeps reported progress monotonic and free of repeats.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    last: Option<f64>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed percent. Returns it only if it advanced.
    pub fn observe(&mut self, percent: f64) -> Option<f64> {
        if !percent.is_finite() {
            return None;
        }
        let percent = percent.clamp(0.0, 100.0);
        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }

    /// The last reported percent.
    pub fn last(&self) -> Option<f64> {
        self.last
    }
}

/// Stateful per-operation tick interpreter.
#[derive(Debug, Clone)]
pub struct Interpreter {
    expectation: Expectation,
    progress: ProgressTracker,
}

impl Interpreter {
    pub fn new(expectation: Expectation) -> Self {
        Self {
            expectation,
            progress: ProgressTracker::new(),
        }
    }

    /// Interpret the current matched set.
    pub fn interpret(&mut self, tick: &Tick) -> Interpretation {
        let items = match &tick.items {
            Ok(items) => items,
            Err(err) => return Interpretation::failed(err.to_string()),
        };

        match &self.expectation {
            Expectation::Uploaded => interpret_upload(items, &mut self.progress),
            Expectation::Downloaded => interpret_download(items, &mut self.progress),
            Expectation::Removed => interpret_removal(items),
            Expectation::Listing { root } => Interpretation {
                files: Some(list_paths(items, root)),
                ..Interpretation::default()
            },
        }
    }
}

/// Upload of a single path: error wins, then progress, then settlement.
pub fn interpret_upload(items: &[RemoteItem], progress: &mut ProgressTracker) -> Interpretation {
    let Some(item) = items.first() else {
        return Interpretation::default();
    };
    if let Some(error) = item.upload_error() {
        return Interpretation::failed(error.message.clone());
    }

    let advanced = item.percent.and_then(|p| progress.observe(p));
    if item.is_uploading() {
        Interpretation {
            progress: advanced,
            ..Interpretation::default()
        }
    } else {
        Interpretation::settled(advanced)
    }
}

/// Download of a single path: settles once the local copy is current.
/// The item existed when the download started, so an empty match means it
/// was removed remotely and nothing will ever materialize.
pub fn interpret_download(items: &[RemoteItem], progress: &mut ProgressTracker) -> Interpretation {
    let Some(item) = items.first() else {
        return Interpretation::failed("item no longer in index");
    };
    if let Some(error) = item.download_error() {
        return Interpretation::failed(error.message.clone());
    }

    let advanced = item.percent.and_then(|p| progress.observe(p));
    if item.is_current() && !item.is_downloading() {
        Interpretation::settled(advanced)
    } else {
        Interpretation {
            progress: advanced,
            ..Interpretation::default()
        }
    }
}

/// Removal settles on the first empty matched set.
pub fn interpret_removal(items: &[RemoteItem]) -> Interpretation {
    if items.is_empty() {
        Interpretation::settled(None)
    } else {
        Interpretation::default()
    }
}

/// Relative paths of the non-directory items below `root`.
pub fn list_paths(items: &[RemoteItem], root: &std::path::Path) -> Vec<String> {
    items
        .iter()
        .filter(|item| !item.is_dir)
        .filter_map(|item| item.relative_to(root))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use stratus_core::{TransferError, TransferState};

    fn uploading(percent: f64) -> RemoteItem {
        RemoteItem::current("/c/a").with_transfer(TransferState::Uploading, Some(percent))
    }

    #[test]
    fn test_progress_tracker_is_monotonic() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.observe(10.0), Some(10.0));
        assert_eq!(tracker.observe(10.0), None);
        assert_eq!(tracker.observe(5.0), None);
        assert_eq!(tracker.observe(140.0), Some(100.0));
        assert_eq!(tracker.observe(f64::NAN), None);
        assert_eq!(tracker.last(), Some(100.0));
    }

    #[test]
    fn test_upload_progress_then_settled() {
        let mut tracker = ProgressTracker::new();
        let out = interpret_upload(&[uploading(40.0)], &mut tracker);
        assert_eq!(out.progress, Some(40.0));
        assert!(out.terminal.is_none());

        let done = RemoteItem::current("/c/a").with_transfer(TransferState::Idle, Some(100.0));
        let out = interpret_upload(&[done], &mut tracker);
        assert_eq!(out.progress, Some(100.0));
        assert_eq!(out.terminal, Some(Terminal::Settled));
    }

    #[test]
    fn test_upload_error_suppresses_progress() {
        let mut tracker = ProgressTracker::new();
        let item = uploading(70.0).with_error(TransferError::upload("denied"));
        let out = interpret_upload(&[item], &mut tracker);
        assert_eq!(out.progress, None);
        assert_eq!(out.terminal, Some(Terminal::Failed("denied".into())));
    }

    #[test]
    fn test_upload_waits_for_item() {
        let mut tracker = ProgressTracker::new();
        assert!(interpret_upload(&[], &mut tracker).is_empty());
    }

    #[test]
    fn test_download_ignores_upload_errors() {
        let mut tracker = ProgressTracker::new();
        let item = RemoteItem::remote_only("/c/a")
            .with_transfer(TransferState::Downloading, Some(20.0))
            .with_error(TransferError::upload("stale"));
        let out = interpret_download(&[item], &mut tracker);
        assert_eq!(out.progress, Some(20.0));
        assert!(out.terminal.is_none());
    }

    #[test]
    fn test_download_settles_when_current() {
        let mut tracker = ProgressTracker::new();
        let out = interpret_download(&[RemoteItem::current("/c/a")], &mut tracker);
        assert_eq!(out.terminal, Some(Terminal::Settled));
    }

    #[test]
    fn test_download_of_vanished_item_fails() {
        let mut tracker = ProgressTracker::new();
        let out = interpret_download(&[], &mut tracker);
        assert_eq!(
            out.terminal,
            Some(Terminal::Failed("item no longer in index".into()))
        );
        assert_eq!(out.progress, None);
    }

    #[test]
    fn test_removal() {
        assert_eq!(interpret_removal(&[]).terminal, Some(Terminal::Settled));
        assert!(interpret_removal(&[RemoteItem::current("/c/a")]).is_empty());
    }

    #[test]
    fn test_list_paths_skips_directories() {
        let items = vec![
            RemoteItem::directory("/c/docs"),
            RemoteItem::current("/c/docs/a.txt"),
            RemoteItem::remote_only("/c/b.txt"),
        ];
        assert_eq!(
            list_paths(&items, Path::new("/c")),
            vec!["docs/a.txt".to_string(), "b.txt".to_string()]
        );
    }
}
