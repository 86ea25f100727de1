//! Directory listing composition.

use tracing::trace;

use crate::attr::NodeKind;
use crate::context::ProcContext;
use crate::error::Result;
use crate::route::{Captures, RouteEntry};

/// Receiver of directory entries.
pub trait DirSink {
    /// Offer one entry. Returns `false` if it did not fit; the caller must
    /// stop emitting.
    fn push(&mut self, name: &str, kind: NodeKind) -> bool;
}

/// How a listing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Every entry was accepted.
    Done,
    /// The sink refused an entry.
    BufferFull,
}

/// Offer every name in order, stopping at the first refusal.
pub fn push_all<I, S>(sink: &mut dyn DirSink, kind: NodeKind, names: I) -> Fill
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for name in names {
        if !sink.push(name.as_ref(), kind) {
            return Fill::BufferFull;
        }
    }
    Fill::Done
}

/// Emit `.`, `..`, the dynamic entries of `entry`, then its static
/// directories, files and links.
pub fn populate(
    ctx: &ProcContext,
    entry: &RouteEntry,
    args: &Captures,
    sink: &mut dyn DirSink,
) -> Result<Fill> {
    if push_all(sink, NodeKind::Directory, [".", ".."]) == Fill::BufferFull {
        return Ok(Fill::BufferFull);
    }
    if entry.list.list(ctx, args, sink)? == Fill::BufferFull {
        trace!("listing of {} filled during dynamic entries", args.path());
        return Ok(Fill::BufferFull);
    }

    let groups = [
        (NodeKind::Directory, entry.static_dirs()),
        (NodeKind::File, entry.static_files()),
        (NodeKind::Symlink, entry.static_links()),
    ];
    for (kind, names) in groups {
        if push_all(sink, kind, names) == Fill::BufferFull {
            return Ok(Fill::BufferFull);
        }
    }
    Ok(Fill::Done)
}

/// A sink that collects entries in memory, optionally bounded.
#[derive(Debug, Default, Clone)]
pub struct Listing {
    entries: Vec<(String, NodeKind)>,
    capacity: Option<usize>,
}

impl Listing {
    /// Unbounded listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Listing that refuses entries past `capacity`.
    pub fn bounded(capacity: usize) -> Self {
        Listing {
            entries: Vec::new(),
            capacity: Some(capacity),
        }
    }

    /// Collected entries in order.
    pub fn entries(&self) -> &[(String, NodeKind)] {
        &self.entries
    }

    /// Collected names in order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Kind of the entry called `name`.
    pub fn kind_of(&self, name: &str) -> Option<NodeKind> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, kind)| *kind)
    }
}

impl DirSink for Listing {
    fn push(&mut self, name: &str, kind: NodeKind) -> bool {
        if let Some(cap) = self.capacity {
            if self.entries.len() >= cap {
                return false;
            }
        }
        self.entries.push((name.to_string(), kind));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcfsError;
    use crate::route::{Route, RouteTables};
    use crate::testing::{mock_context, MockHardware, MockIntrospector};
    use std::sync::Arc;

    fn ctx() -> ProcContext {
        mock_context(Arc::new(MockIntrospector::new()), MockHardware::new(1))
    }

    fn two_numbers(_ctx: &ProcContext, _args: &Captures, sink: &mut dyn DirSink) -> Result<Fill> {
        Ok(push_all(sink, NodeKind::Directory, ["1", "2"]))
    }

    fn broken(_ctx: &ProcContext, _args: &Captures, _sink: &mut dyn DirSink) -> Result<Fill> {
        Err(ProcfsError::unavailable("enumeration failed"))
    }

    fn tables() -> RouteTables {
        RouteTables::build(vec![
            Route::dir("/")
                .list(two_numbers)
                .dirs(&["hardware"])
                .files(&["version"])
                .links(&["self"]),
            Route::dir("/static").dirs(&["a"]).files(&["b"]),
            Route::dir("/broken").list(broken).files(&["never"]),
        ])
        .unwrap()
    }

    fn list(path: &str, sink: &mut Listing) -> Result<Fill> {
        let tables = tables();
        let entry = tables
            .dirs
            .entries()
            .iter()
            .find(|e| e.pattern() == path)
            .unwrap();
        let args = entry.matches(path).unwrap();
        populate(&ctx(), entry, &args, sink)
    }

    #[test]
    fn test_order_is_dot_dynamic_dirs_files_links() {
        let mut sink = Listing::new();
        assert_eq!(list("/", &mut sink).unwrap(), Fill::Done);
        assert_eq!(
            sink.names(),
            vec![".", "..", "1", "2", "hardware", "version", "self"]
        );
        assert_eq!(sink.kind_of("hardware"), Some(NodeKind::Directory));
        assert_eq!(sink.kind_of("version"), Some(NodeKind::File));
        assert_eq!(sink.kind_of("self"), Some(NodeKind::Symlink));
    }

    #[test]
    fn test_static_only_directory() {
        let mut sink = Listing::new();
        assert_eq!(list("/static", &mut sink).unwrap(), Fill::Done);
        assert_eq!(sink.names(), vec![".", "..", "a", "b"]);
    }

    #[test]
    fn test_buffer_full_stops_immediately() {
        for cap in 0..7 {
            let mut sink = Listing::bounded(cap);
            assert_eq!(list("/", &mut sink).unwrap(), Fill::BufferFull);
            assert_eq!(sink.entries().len(), cap);
        }
        let mut sink = Listing::bounded(7);
        assert_eq!(list("/", &mut sink).unwrap(), Fill::Done);
    }

    #[test]
    fn test_dynamic_failure_propagates() {
        let mut sink = Listing::new();
        let result = list("/broken", &mut sink);
        assert!(matches!(result, Err(ProcfsError::Unavailable { .. })));
        assert_eq!(sink.names(), vec![".", ".."]);
    }

    #[test]
    fn test_push_all_reports_refusal() {
        let mut sink = Listing::bounded(1);
        assert_eq!(push_all(&mut sink, NodeKind::File, ["a", "b"]), Fill::BufferFull);
        assert_eq!(sink.names(), vec!["a"]);
    }
}
