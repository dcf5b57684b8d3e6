//! Store operation types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The kind of logical operation backing an event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    List,
    Upload,
    Download,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::List => write!(f, "List"),
            Self::Upload => write!(f, "Upload"),
            Self::Download => write!(f, "Download"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

/// Copy a local file into the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Subdirectory of the container, if any.
    pub directory: Option<String>,
    /// Source file on the local filesystem.
    pub local_path: PathBuf,
    /// Destination name relative to the resolved root.
    pub cloud_name: String,
    /// Channel receiving progress, if any.
    pub channel: Option<String>,
}

impl UploadRequest {
    /// Create an upload request without a channel.
    pub fn new(local_path: impl Into<PathBuf>, cloud_name: impl Into<String>) -> Self {
        Self {
            directory: None,
            local_path: local_path.into(),
            cloud_name: cloud_name.into(),
            channel: None,
        }
    }

    /// Upload into a subdirectory of the container.
    pub fn in_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Report progress on the named channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// Materialize a remote file and copy it to a local path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub directory: Option<String>,
    /// Name of the file relative to the resolved root.
    pub cloud_name: String,
    /// Where the downloaded copy is placed.
    pub local_path: PathBuf,
    pub channel: Option<String>,
}

impl DownloadRequest {
    /// Create a download request without a channel.
    pub fn new(cloud_name: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            directory: None,
            cloud_name: cloud_name.into(),
            local_path: local_path.into(),
            channel: None,
        }
    }

    pub fn in_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// Remove one or more files from the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub directory: Option<String>,
    /// Names relative to the resolved root.
    pub cloud_names: Vec<String>,
    pub channel: Option<String>,
}

impl DeleteRequest {
    /// Delete a single file.
    pub fn single(cloud_name: impl Into<String>) -> Self {
        Self::many(vec![cloud_name.into()])
    }

    /// Delete a list of files.
    pub fn many(cloud_names: Vec<String>) -> Self {
        Self {
            directory: None,
            cloud_names,
            channel: None,
        }
    }

    pub fn in_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// Treat an empty channel name as no channel.
pub(crate) fn channel_name(channel: &Option<String>) -> Option<&str> {
    channel.as_deref().filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_channel_is_none() {
        assert_eq!(channel_name(&None), None);
        assert_eq!(channel_name(&Some(String::new())), None);
        assert_eq!(channel_name(&Some("up-1".into())), Some("up-1"));
    }

    #[test]
    fn test_request_builders() {
        let req = UploadRequest::new("/tmp/a", "a.txt")
            .in_directory("Documents")
            .with_channel("up");
        assert_eq!(req.directory.as_deref(), Some("Documents"));
        assert_eq!(req.channel.as_deref(), Some("up"));

        let req = DeleteRequest::single("a.txt");
        assert_eq!(req.cloud_names, vec!["a.txt".to_string()]);
    }
}
