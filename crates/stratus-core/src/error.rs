//! Error types for store operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while serving a store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed or missing call arguments.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The container root could not be resolved, or no identity is signed in.
    #[error("Container unavailable")]
    ContainerUnavailable,

    /// The store has not been initialized with a container identifier.
    #[error("Store is not initialized")]
    NotInitialized,

    /// An event channel with this name is still active.
    #[error("Event channel already active: {name}")]
    ChannelInUse { name: String },

    /// No event channel with this name was created.
    #[error("Unknown event channel: {name}")]
    UnknownChannel { name: String },

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The provider reported a failure for an item.
    #[error("Provider error: {message}")]
    Provider { message: String },

    /// The control loop is no longer running.
    #[error("Store was shut down")]
    Shutdown,
}

impl StoreError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create an invalid argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a provider error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// The external error category this error maps to.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument { .. } | Self::ChannelInUse { .. } | Self::UnknownChannel { .. } => {
                ErrorCode::Argument
            }
            Self::ContainerUnavailable | Self::NotInitialized => ErrorCode::Container,
            Self::PermissionDenied { .. }
            | Self::NotFound { .. }
            | Self::Io { .. }
            | Self::Provider { .. }
            | Self::Shutdown => ErrorCode::Native,
        }
    }
}

/// External error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed or missing arguments.
    #[serde(rename = "E_ARG")]
    Argument,
    /// Root location unavailable or identity not signed in.
    #[serde(rename = "E_CTR")]
    Container,
    /// Underlying filesystem or provider failure.
    #[serde(rename = "E_NAT")]
    Native,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Argument => "E_ARG",
            Self::Container => "E_CTR",
            Self::Native => "E_NAT",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_io() {
        let err = StoreError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, StoreError::PermissionDenied { .. }));
        assert_eq!(err.code(), ErrorCode::Native);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreError::invalid("x").code(), ErrorCode::Argument);
        assert_eq!(StoreError::ContainerUnavailable.code(), ErrorCode::Container);
        assert_eq!(
            StoreError::ChannelInUse { name: "a".into() }.code(),
            ErrorCode::Argument
        );
        assert_eq!(ErrorCode::Native.to_string(), "E_NAT");
    }
}
