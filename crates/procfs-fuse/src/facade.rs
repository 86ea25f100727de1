//! The four operations the filesystem exposes.
//!
//! Each operation runs the process existence guard, resolves the path
//! against the route tables and invokes the matched entry's handler. Errors
//! are returned as [`ProcfsError`]; [`ProcfsError::to_errno`] gives the value
//! to reply with.

use std::sync::Arc;

use tracing::debug;

use crate::attr::{NodeAttr, NodeKind};
use crate::compose::{self, DirSink, Fill};
use crate::context::ProcContext;
use crate::dispatch::{dispatch, Operation};
use crate::error::{Result, RouteError};
use crate::guard;
use crate::handlers;
use crate::route::RouteTables;

/// Path-based entry point: getattr, read, list and readlink.
#[derive(Clone)]
pub struct Procfs {
    ctx: ProcContext,
    tables: Arc<RouteTables>,
}

impl Procfs {
    /// Serve `tables` with `ctx`.
    pub fn new(ctx: ProcContext, tables: RouteTables) -> Self {
        Procfs {
            ctx,
            tables: Arc::new(tables),
        }
    }

    /// Serve the built-in route table.
    pub fn with_default_routes(ctx: ProcContext) -> std::result::Result<Self, RouteError> {
        Ok(Self::new(ctx, handlers::default_tables()?))
    }

    /// Shared handler context.
    pub fn context(&self) -> &ProcContext {
        &self.ctx
    }

    /// The compiled route tables.
    pub fn tables(&self) -> &RouteTables {
        &self.tables
    }

    fn guard(&self, path: &str) -> Result<()> {
        guard::check_process(self.ctx.introspector(), path)
    }

    /// Attributes of `path`.
    pub fn getattr(&self, path: &str) -> Result<NodeAttr> {
        self.guard(path)?;
        let (entry, args) = dispatch(&self.tables, Operation::GetAttr, path)?;
        entry.attr.getattr(&self.ctx, &args)
    }

    /// Read at most `size` bytes at `offset`. Reading past the end returns
    /// an empty buffer.
    pub fn read(&self, path: &str, size: usize, offset: u64) -> Result<Vec<u8>> {
        self.guard(path)?;
        let (entry, args) = dispatch(&self.tables, Operation::Read, path)?;
        let mut data = entry.read.read(&self.ctx, &args, size, offset)?;
        if data.len() > size {
            debug!(path, len = data.len(), size, "handler overran read size");
            data.truncate(size);
        }
        Ok(data)
    }

    /// List `path` into `sink`.
    pub fn list(&self, path: &str, sink: &mut dyn DirSink) -> Result<Fill> {
        self.guard(path)?;
        let (entry, args) = dispatch(&self.tables, Operation::List, path)?;
        match entry.kind() {
            NodeKind::Directory => compose::populate(&self.ctx, entry, &args, sink),
            NodeKind::File | NodeKind::Symlink => entry.list.list(&self.ctx, &args, sink),
        }
    }

    /// Target of the link at `path`.
    pub fn readlink(&self, path: &str) -> Result<String> {
        self.guard(path)?;
        let (entry, args) = dispatch(&self.tables, Operation::ReadLink, path)?;
        entry.link.readlink(&self.ctx, &args)
    }
}

impl std::fmt::Debug for Procfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Procfs")
            .field("ctx", &self.ctx)
            .field("routes", &self.tables.len())
            .finish()
    }
}

/// Map an operation result onto the errno convention: `0` for success.
pub fn errno_of<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.to_errno(),
    }
}
