//! Directory-backed cloud provider for stratus.
//!
//! [`LocalProvider`] implements [`stratus_core::CloudProvider`] on top of a
//! plain directory tree. It keeps a simulated sync index: files written into
//! a container report as uploading, evicted files are kept as `.name.icloud`
//! placeholders, and [`SyncDriver`] advances in-flight transfers on a timer.
//! Tests drive the same state machine by hand with [`LocalProvider::step`],
//! [`LocalProvider::set_progress`] and [`LocalProvider::fail`].

mod driver;
mod index;
mod provider;

pub use driver::SyncDriver;
pub use provider::LocalProvider;
