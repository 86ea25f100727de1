#![warn(missing_docs)]

//! Live process, thread, descriptor and hardware state as a read-only
//! filesystem.
//!
//! Paths are resolved against regex route tables; each matching route
//! carries the handlers that synthesize attributes, contents, listings and
//! link targets on demand. The `filesystem` module adapts the path-based
//! operations to FUSE.

pub mod attr;
pub mod compose;
pub mod config;
pub mod content;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod facade;
pub mod filesystem;
pub mod guard;
pub mod handlers;
pub mod handles;
pub mod inode;
pub mod introspect;
pub mod mount;
pub mod route;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ProcfsError, Result};
pub use facade::Procfs;
