//! Path resolution against the route tables.

use tracing::debug;

use crate::attr::NodeKind;
use crate::error::{ProcfsError, Result};
use crate::route::{Captures, RouteEntry, RouteTable, RouteTables};

/// The four externally visible operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Attribute lookup.
    GetAttr,
    /// File read.
    Read,
    /// Directory listing.
    List,
    /// Link resolution.
    ReadLink,
}

impl Operation {
    /// Tables searched for this operation, in order. Each operation looks at
    /// its own table first so that a path of the wrong kind still reports the
    /// stub error of the entry it matches.
    pub fn search_order(self) -> [NodeKind; 3] {
        use NodeKind::*;
        match self {
            Operation::GetAttr | Operation::List => [Directory, File, Symlink],
            Operation::Read => [File, Directory, Symlink],
            Operation::ReadLink => [Symlink, Directory, File],
        }
    }
}

/// First entry of `table` whose pattern fully matches `path`.
pub fn resolve<'t>(table: &'t RouteTable, path: &str) -> Option<(&'t RouteEntry, Captures)> {
    table
        .entries()
        .iter()
        .find_map(|entry| entry.matches(path).map(|caps| (entry, caps)))
}

/// Resolve `path` for `op`, searching the tables in the operation's order.
pub fn dispatch<'t>(
    tables: &'t RouteTables,
    op: Operation,
    path: &str,
) -> Result<(&'t RouteEntry, Captures)> {
    for kind in op.search_order() {
        if let Some((entry, caps)) = resolve(tables.table(kind), path) {
            debug!(?op, path, pattern = entry.pattern(), "resolved");
            return Ok((entry, caps));
        }
    }
    debug!(?op, path, "no route");
    Err(ProcfsError::no_such_entry(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Rendered;
    use crate::context::ProcContext;
    use crate::route::Route;

    fn fixed(_ctx: &ProcContext, _args: &Captures) -> Result<String> {
        Ok("fixed".to_string())
    }

    fn numbered(_ctx: &ProcContext, args: &Captures) -> Result<String> {
        Ok(args[0].to_string())
    }

    fn target(_ctx: &ProcContext, _args: &Captures) -> Result<String> {
        Ok("/".to_string())
    }

    fn tables() -> RouteTables {
        RouteTables::build(vec![
            Route::file("/fixed", 0, Rendered(fixed)),
            Route::file(r"/(\d+)", 1, Rendered(numbered)),
            Route::dir("/"),
            Route::dir(r"/d/(\d+)").arity(1),
            Route::link(r"/d/(\d+)/cwd", 1, target),
        ])
        .unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let tables = tables();
        let (entry, caps) = resolve(&tables.files, "/fixed").unwrap();
        assert_eq!(entry.pattern(), "/fixed");
        assert!(caps.is_empty());

        let (entry, caps) = resolve(&tables.files, "/12").unwrap();
        assert_eq!(entry.pattern(), r"/(\d+)");
        assert_eq!(&caps[0], "12");
    }

    #[test]
    fn test_partial_matches_never_hit() {
        let tables = tables();
        assert!(resolve(&tables.files, "/12x").is_none());
        assert!(resolve(&tables.files, "/fixed/").is_none());
        assert!(resolve(&tables.files, "fixed").is_none());
    }

    #[test]
    fn test_dispatch_not_found() {
        let tables = tables();
        let result = dispatch(&tables, Operation::GetAttr, "/nope");
        assert!(matches!(result, Err(ProcfsError::NoSuchEntry { .. })));
    }

    #[test]
    fn test_dispatch_falls_back_to_other_tables() {
        let tables = tables();
        let (entry, _) = dispatch(&tables, Operation::Read, "/d/3").unwrap();
        assert_eq!(entry.kind(), NodeKind::Directory);

        let (entry, _) = dispatch(&tables, Operation::List, "/fixed").unwrap();
        assert_eq!(entry.kind(), NodeKind::File);

        let (entry, _) = dispatch(&tables, Operation::ReadLink, "/d/3").unwrap();
        assert_eq!(entry.kind(), NodeKind::Directory);

        let (entry, _) = dispatch(&tables, Operation::GetAttr, "/d/3/cwd").unwrap();
        assert_eq!(entry.kind(), NodeKind::Symlink);
    }

    #[test]
    fn test_search_orders() {
        use NodeKind::*;
        assert_eq!(
            Operation::GetAttr.search_order(),
            [Directory, File, Symlink]
        );
        assert_eq!(Operation::Read.search_order(), [File, Directory, Symlink]);
        assert_eq!(Operation::List.search_order(), [Directory, File, Symlink]);
        assert_eq!(
            Operation::ReadLink.search_order(),
            [Symlink, Directory, File]
        );
    }
}
