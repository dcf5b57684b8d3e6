//! Transfer orchestration for stratus.
//!
//! This crate provides:
//! - [`CloudStore`], a cloneable handle to the control loop that runs every
//!   list, upload, download and delete operation
//! - [`EventStream`], the subscriber side of a named event channel
//! - [`Dispatcher`], which decodes named calls with JSON arguments
//!
//! Each operation does its synchronous filesystem step, then attaches a
//! watch and interprets its ticks until the operation settles. A channel
//! sees zero or more progress or listing events followed by exactly one
//! terminal event, unless the subscriber cancels first.

mod channel;
mod dispatch;
mod engine;
mod fsops;
mod operation;
mod store;

pub use channel::{fixed_message, ErrorPayload, EventStream, StreamEvent};
pub use dispatch::{CallError, Dispatcher, Request, Response, StreamForwarder, METHODS};
pub use engine::EngineStats;
pub use operation::{DeleteRequest, DownloadRequest, OperationKind, UploadRequest};
pub use store::CloudStore;
