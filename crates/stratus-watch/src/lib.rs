//! Watch-and-notify engine for stratus.
//!
//! A [`WatchQuery`] is a standing observation of the provider's index scoped
//! by a [`stratus_core::PathPredicate`]. It delivers a [`Tick`] carrying the
//! full matched set once the initial scan finishes and again after every
//! relevant index change, until it is stopped.
//!
//! All watches feed a single [`TickSink`]. The consumer drains it from one
//! task, so tick handlers never run concurrently with each other.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stratus_core::PathPredicate;
//! use stratus_local::LocalProvider;
//! use stratus_watch::{Expectation, Interpreter, Tick, WatchQuery};
//!
//! # async fn demo() {
//! let provider = Arc::new(LocalProvider::new("/tmp/containers"));
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Tick>();
//! let mut query = WatchQuery::start(provider, PathPredicate::exact("/tmp/containers/c/a.txt"), tx);
//!
//! let mut interpreter = Interpreter::new(Expectation::Uploaded);
//! while let Some(tick) = rx.recv().await {
//!     let out = interpreter.interpret(&tick);
//!     if out.terminal.is_some() {
//!         query.stop();
//!         break;
//!     }
//! }
//! # }
//! ```

mod query;
mod signal;
mod tick;

pub use query::WatchQuery;
pub use signal::{
    interpret_download, interpret_removal, interpret_upload, list_paths, Expectation,
    Interpretation, Interpreter, ProgressTracker, Terminal,
};
pub use tick::{Tick, TickSink, WatchId, WatchPhase};
