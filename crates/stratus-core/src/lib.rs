//! Core types and traits for stratus.
//!
//! This crate provides the data model shared by the watch engine and the
//! transfer orchestrator: remote item snapshots, path predicates, the error
//! taxonomy, configuration, path resolution, and the provider interface.

mod config;
mod error;
mod item;
mod predicate;
mod provider;
pub mod resolver;

pub use config::{ConfigError, StoreConfig, StoreConfigBuilder, DEFAULT_CHANNEL_CAPACITY};
pub use error::{ErrorCode, StoreError, StoreResult};
pub use item::{DownloadStatus, RemoteItem, TransferDirection, TransferError, TransferState};
pub use predicate::PathPredicate;
pub use provider::{CloudProvider, IndexChange};
