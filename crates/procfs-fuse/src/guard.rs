//! Rejection of paths naming processes that do not exist.

use tracing::debug;

use crate::error::{ProcfsError, Result};
use crate::introspect::{Introspector, Pid};

/// Reject paths whose leading numeric segment does not name a live process.
/// Paths that do not start with a numeric segment pass through.
pub fn check_process(introspector: &dyn Introspector, path: &str) -> Result<()> {
    let first = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or("");
    if first.is_empty() || !first.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(());
    }
    let live = first
        .parse::<Pid>()
        .map(|pid| introspector.process_exists(pid))
        .unwrap_or(false);
    if live {
        Ok(())
    } else {
        debug!(path, "process gone");
        Err(ProcfsError::no_such_entry(path))
    }
}
