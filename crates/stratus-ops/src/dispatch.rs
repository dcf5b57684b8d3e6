//! Named-call boundary: decodes a method name and JSON arguments once and
//! routes the typed request to the store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stratus_core::{ErrorCode, StoreError};
use thiserror::Error;
use tracing::debug;

use crate::channel::{ErrorPayload, EventStream};
use crate::operation::{channel_name, DeleteRequest, DownloadRequest, UploadRequest};
use crate::store::CloudStore;

/// Methods a [`Dispatcher`] understands.
pub const METHODS: &[&str] = &[
    "initialize",
    "isAvailable",
    "subFiles",
    "listFiles",
    "upload",
    "download",
    "delete",
    "deleteList",
    "createEventChannel",
    "cancelEventChannel",
];

/// A decoded call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "arguments", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    Initialize { container_id: String },

    IsAvailable {},

    #[serde(rename_all = "camelCase")]
    SubFiles {
        #[serde(default)]
        directory: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    ListFiles {
        #[serde(default)]
        directory: Option<String>,
        #[serde(default)]
        event_channel_name: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    Upload {
        #[serde(default)]
        directory: Option<String>,
        local_file_path: PathBuf,
        cloud_file_name: String,
        #[serde(default)]
        event_channel_name: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    Download {
        #[serde(default)]
        directory: Option<String>,
        cloud_file_name: String,
        local_file_path: PathBuf,
        #[serde(default)]
        event_channel_name: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    Delete {
        #[serde(default)]
        directory: Option<String>,
        cloud_file_name: String,
        #[serde(default)]
        event_channel_name: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    DeleteList {
        #[serde(default)]
        directory: Option<String>,
        cloud_file_name_list: Vec<String>,
        #[serde(default)]
        event_channel_name: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    CreateEventChannel { event_channel_name: String },

    /// Subscriber-side cancellation of a channel.
    #[serde(rename_all = "camelCase")]
    CancelEventChannel { event_channel_name: String },
}

impl Request {
    /// Decode a call. Missing arguments are treated as an empty map.
    pub fn decode(method: &str, arguments: Value) -> Result<Self, CallError> {
        if !METHODS.contains(&method) {
            return Err(CallError::not_implemented(method));
        }
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        serde_json::from_value(json!({ "method": method, "arguments": arguments }))
            .map_err(|e| CallError::invalid_arguments(e.to_string()))
    }
}

/// Successful call result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Null,
    Bool(bool),
    Paths(Vec<String>),
}

/// Failed call result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("Method not implemented: {method}")]
    NotImplemented { method: String },

    #[error("{}: {}", .0.code, .0.message)]
    Failed(ErrorPayload),
}

impl CallError {
    pub fn not_implemented(method: impl Into<String>) -> Self {
        Self::NotImplemented {
            method: method.into(),
        }
    }

    pub fn invalid_arguments(details: impl Into<String>) -> Self {
        Self::Failed(ErrorPayload::new(ErrorCode::Argument, details))
    }

    /// Error category, or `None` for an unknown method.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::NotImplemented { .. } => None,
            Self::Failed(payload) => Some(payload.code),
        }
    }

    /// Wire form: `{code, message, details?}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::NotImplemented { method } => json!({
                "code": "E_NOT_IMPLEMENTED",
                "message": self.to_string(),
                "details": method,
            }),
            Self::Failed(payload) => json!(payload),
        }
    }
}

impl From<StoreError> for CallError {
    fn from(err: StoreError) -> Self {
        Self::Failed(ErrorPayload::from(&err))
    }
}

/// Receives the subscriber side of every channel created through a
/// [`Dispatcher`].
pub trait StreamForwarder: Send + Sync {
    fn forward(&self, stream: EventStream);
}

impl<F> StreamForwarder for F
where
    F: Fn(EventStream) + Send + Sync,
{
    fn forward(&self, stream: EventStream) {
        self(stream)
    }
}

/// Routes decoded calls to a [`CloudStore`].
pub struct Dispatcher<F> {
    store: CloudStore,
    forwarder: F,
}

impl<F: StreamForwarder> Dispatcher<F> {
    pub fn new(store: CloudStore, forwarder: F) -> Self {
        Self { store, forwarder }
    }

    pub fn store(&self) -> &CloudStore {
        &self.store
    }

    /// Decode and handle one call.
    pub async fn call(&self, method: &str, arguments: Value) -> Result<Response, CallError> {
        let request = Request::decode(method, arguments)?;
        self.handle(request).await
    }

    pub async fn handle(&self, request: Request) -> Result<Response, CallError> {
        debug!(?request, "dispatching");
        let store = &self.store;

        let response = match request {
            Request::Initialize { container_id } => {
                store.initialize(&container_id)?;
                Response::Null
            }
            Request::IsAvailable {} => Response::Bool(store.is_available()),
            Request::SubFiles { directory } => {
                Response::Paths(store.sub_files(directory.as_deref()).await?)
            }
            Request::ListFiles {
                directory,
                event_channel_name,
            } => match channel_name(&event_channel_name) {
                None => Response::Paths(store.list_files(directory.as_deref()).await?),
                Some(channel) => {
                    store.watch_files(directory.as_deref(), channel).await?;
                    Response::Null
                }
            },
            Request::Upload {
                directory,
                local_file_path,
                cloud_file_name,
                event_channel_name,
            } => {
                store
                    .upload(UploadRequest {
                        directory,
                        local_path: local_file_path,
                        cloud_name: cloud_file_name,
                        channel: event_channel_name,
                    })
                    .await?;
                Response::Null
            }
            Request::Download {
                directory,
                cloud_file_name,
                local_file_path,
                event_channel_name,
            } => {
                store
                    .download(DownloadRequest {
                        directory,
                        cloud_name: cloud_file_name,
                        local_path: local_file_path,
                        channel: event_channel_name,
                    })
                    .await?;
                Response::Null
            }
            Request::Delete {
                directory,
                cloud_file_name,
                event_channel_name,
            } => {
                store
                    .delete(DeleteRequest {
                        directory,
                        cloud_names: vec![cloud_file_name],
                        channel: event_channel_name,
                    })
                    .await?;
                Response::Null
            }
            Request::DeleteList {
                directory,
                cloud_file_name_list,
                event_channel_name,
            } => {
                store
                    .delete(DeleteRequest {
                        directory,
                        cloud_names: cloud_file_name_list,
                        channel: event_channel_name,
                    })
                    .await?;
                Response::Null
            }
            Request::CreateEventChannel { event_channel_name } => {
                let stream = store.create_event_channel(&event_channel_name).await?;
                self.forwarder.forward(stream);
                Response::Null
            }
            Request::CancelEventChannel { event_channel_name } => {
                store.cancel_event_channel(&event_channel_name).await?;
                Response::Null
            }
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_upload() {
        let request = Request::decode(
            "upload",
            json!({
                "localFilePath": "/tmp/a.txt",
                "cloudFileName": "a.txt",
                "eventChannelName": "up-1",
            }),
        )
        .unwrap();
        assert_eq!(
            request,
            Request::Upload {
                directory: None,
                local_file_path: PathBuf::from("/tmp/a.txt"),
                cloud_file_name: "a.txt".into(),
                event_channel_name: Some("up-1".into()),
            }
        );
    }

    #[test]
    fn test_decode_without_arguments() {
        assert_eq!(
            Request::decode("isAvailable", Value::Null).unwrap(),
            Request::IsAvailable {}
        );
        assert_eq!(
            Request::decode("listFiles", Value::Null).unwrap(),
            Request::ListFiles {
                directory: None,
                event_channel_name: None,
            }
        );
    }

    #[test]
    fn test_decode_missing_argument_is_e_arg() {
        let err = Request::decode("initialize", json!({})).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Argument));
        assert_eq!(err.to_json()["message"], "Invalid Arguments");

        let err = Request::decode("deleteList", json!({ "cloudFileNameList": "a" })).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Argument));
    }

    #[test]
    fn test_decode_cancel_event_channel() {
        assert_eq!(
            Request::decode("cancelEventChannel", json!({ "eventChannelName": "ls" })).unwrap(),
            Request::CancelEventChannel {
                event_channel_name: "ls".into(),
            }
        );
        let err = Request::decode("cancelEventChannel", Value::Null).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Argument));
    }

    #[test]
    fn test_decode_unknown_method() {
        let err = Request::decode("rename", json!({})).unwrap_err();
        assert_eq!(err, CallError::not_implemented("rename"));
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_response_serialization() {
        assert_eq!(serde_json::to_string(&Response::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Response::Bool(true)).unwrap(), "true");
        assert_eq!(
            serde_json::to_string(&Response::Paths(vec!["a".into()])).unwrap(),
            r#"["a"]"#
        );
    }

    #[test]
    fn test_store_error_mapping() {
        let err = CallError::from(StoreError::NotInitialized);
        assert_eq!(err.code(), Some(ErrorCode::Container));
        let json = err.to_json();
        assert_eq!(json["code"], "E_CTR");
        assert!(json["details"].is_string());
    }
}
