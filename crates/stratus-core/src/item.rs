//! Point-in-time snapshots of entries in the remote index.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Direction of an in-flight transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferState {
    /// No transfer in progress.
    #[default]
    Idle,
    /// Local bytes are being pushed to the remote store.
    Uploading,
    /// Remote bytes are being materialized locally.
    Downloading,
}

/// How much of an item is present on the local side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DownloadStatus {
    /// Only a placeholder exists locally.
    #[default]
    NotDownloaded,
    /// A local copy exists but a newer remote version is known.
    Downloaded,
    /// The local copy matches the latest remote version.
    Current,
}

/// Which transfer an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDirection {
    Upload,
    Download,
}

/// A failure reported by the provider for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferError {
    pub direction: TransferDirection,
    pub message: String,
}

impl TransferError {
    /// Create an upload failure.
    pub fn upload(message: impl Into<String>) -> Self {
        Self {
            direction: TransferDirection::Upload,
            message: message.into(),
        }
    }

    /// Create a download failure.
    pub fn download(message: impl Into<String>) -> Self {
        Self {
            direction: TransferDirection::Download,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.direction {
            TransferDirection::Upload => write!(f, "upload failed: {}", self.message),
            TransferDirection::Download => write!(f, "download failed: {}", self.message),
        }
    }
}

/// One matched entry of the remote index. Recomputed on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Absolute path of the entry.
    pub path: PathBuf,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Current transfer direction.
    pub transfer: TransferState,
    /// Percent complete of the current transfer (0.0 to 100.0).
    pub percent: Option<f64>,
    /// Local materialization status.
    pub download_status: DownloadStatus,
    /// Pending transfer error, if any.
    pub error: Option<TransferError>,
}

impl RemoteItem {
    /// A settled, fully materialized file.
    pub fn current(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            transfer: TransferState::Idle,
            percent: None,
            download_status: DownloadStatus::Current,
            error: None,
        }
    }

    /// A remote-only file that has not been downloaded.
    pub fn remote_only(path: impl Into<PathBuf>) -> Self {
        Self {
            download_status: DownloadStatus::NotDownloaded,
            ..Self::current(path)
        }
    }

    /// A settled directory.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            is_dir: true,
            ..Self::current(path)
        }
    }

    /// Set the transfer state and percent.
    pub fn with_transfer(mut self, transfer: TransferState, percent: Option<f64>) -> Self {
        self.transfer = transfer;
        self.percent = percent;
        self
    }

    /// Attach a pending error.
    pub fn with_error(mut self, error: TransferError) -> Self {
        self.error = Some(error);
        self
    }

    /// Whether an upload is in flight.
    pub fn is_uploading(&self) -> bool {
        self.transfer == TransferState::Uploading
    }

    /// Whether a download is in flight.
    pub fn is_downloading(&self) -> bool {
        self.transfer == TransferState::Downloading
    }

    /// Whether the local copy is current.
    pub fn is_current(&self) -> bool {
        self.download_status == DownloadStatus::Current
    }

    /// The pending upload error, if any.
    pub fn upload_error(&self) -> Option<&TransferError> {
        self.error
            .as_ref()
            .filter(|e| e.direction == TransferDirection::Upload)
    }

    /// The pending download error, if any.
    pub fn download_error(&self) -> Option<&TransferError> {
        self.error
            .as_ref()
            .filter(|e| e.direction == TransferDirection::Download)
    }

    /// Path of the entry relative to `root`, if it lives under it.
    pub fn relative_to(&self, root: &Path) -> Option<String> {
        self.path
            .strip_prefix(root)
            .ok()
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(|rel| rel.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_direction_filters() {
        let item = RemoteItem::current("/c/a.txt").with_error(TransferError::upload("quota"));
        assert!(item.upload_error().is_some());
        assert!(item.download_error().is_none());
    }

    #[test]
    fn test_relative_to() {
        let item = RemoteItem::current("/c/docs/a.txt");
        assert_eq!(item.relative_to(Path::new("/c")).as_deref(), Some("docs/a.txt"));
        assert_eq!(item.relative_to(Path::new("/other")), None);
        assert_eq!(
            RemoteItem::directory("/c").relative_to(Path::new("/c")),
            None
        );
    }
}
