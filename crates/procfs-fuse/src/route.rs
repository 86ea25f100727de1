//! Declarative route tables.
//!
//! A [`Route`] binds a path pattern to the handlers that serve it. Routes are
//! declared as plain data, compiled once into [`RouteTables`] and then shared
//! read-only by every request. Each compiled [`RouteEntry`] carries all four
//! operations; the ones that do not apply to its node kind are filled in with
//! stubs that report the matching structural error.

use std::ops::Index;
use std::sync::Arc;

use regex::Regex;

use crate::attr::{NodeAttr, NodeKind};
use crate::compose::{DirSink, Fill};
use crate::context::ProcContext;
use crate::error::{ProcfsError, Result, RouteError};
use crate::introspect::Pid;

/// Largest number of capture groups a pattern may declare.
pub const MAX_ARITY: usize = 3;

/// Arguments extracted from a matched path, left to right.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    path: String,
    values: Vec<String>,
}

impl Captures {
    /// Captures of `path`.
    pub fn new(path: impl Into<String>, values: Vec<String>) -> Self {
        Captures {
            path: path.into(),
            values,
        }
    }

    /// The full path that produced these captures.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of captures.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Capture `i`, if present.
    pub fn get(&self, i: usize) -> Option<&str> {
        self.values.get(i).map(String::as_str)
    }

    /// Capture `i` as a process identifier. A value that does not fit names
    /// no process.
    pub fn pid(&self, i: usize) -> Result<Pid> {
        self[i]
            .parse()
            .map_err(|_| ProcfsError::no_such_entry(self.path.clone()))
    }

    /// Capture `i` as a decimal index.
    pub fn number(&self, i: usize) -> Result<usize> {
        self[i]
            .parse()
            .map_err(|_| ProcfsError::no_such_entry(self.path.clone()))
    }

    /// Capture `i` as a hexadecimal handle name. Only the canonical
    /// rendering used in listings is accepted, so `00` names nothing.
    pub fn hex(&self, i: usize) -> Result<u32> {
        let text = &self[i];
        match u32::from_str_radix(text, 16) {
            Ok(value) if format!("{:x}", value) == text => Ok(value),
            _ => Err(ProcfsError::no_such_entry(self.path.clone())),
        }
    }

    /// The error for a capture that names nothing.
    pub fn no_such_entry(&self) -> ProcfsError {
        ProcfsError::no_such_entry(self.path.clone())
    }
}

impl Index<usize> for Captures {
    type Output = str;

    fn index(&self, i: usize) -> &str {
        self.get(i).unwrap_or("")
    }
}

/// Produces the attributes of a node.
pub trait AttrHandler: Send + Sync {
    /// Attributes of the node `args` names.
    fn getattr(&self, ctx: &ProcContext, args: &Captures) -> Result<NodeAttr>;
}

/// Produces file content.
pub trait ReadHandler: Send + Sync {
    /// Return at most `size` bytes starting at `offset`.
    fn read(&self, ctx: &ProcContext, args: &Captures, size: usize, offset: u64)
        -> Result<Vec<u8>>;
}

/// Produces the dynamic portion of a directory listing.
pub trait ListHandler: Send + Sync {
    /// Offer the dynamic entries to `sink`.
    fn list(&self, ctx: &ProcContext, args: &Captures, sink: &mut dyn DirSink) -> Result<Fill>;
}

/// Resolves a symbolic link.
pub trait LinkHandler: Send + Sync {
    /// Target of the link `args` names.
    fn readlink(&self, ctx: &ProcContext, args: &Captures) -> Result<String>;
}

impl<F> AttrHandler for F
where
    F: Fn(&ProcContext, &Captures) -> Result<NodeAttr> + Send + Sync,
{
    fn getattr(&self, ctx: &ProcContext, args: &Captures) -> Result<NodeAttr> {
        self(ctx, args)
    }
}

impl<F> ReadHandler for F
where
    F: Fn(&ProcContext, &Captures, usize, u64) -> Result<Vec<u8>> + Send + Sync,
{
    fn read(
        &self,
        ctx: &ProcContext,
        args: &Captures,
        size: usize,
        offset: u64,
    ) -> Result<Vec<u8>> {
        self(ctx, args, size, offset)
    }
}

impl<F> ListHandler for F
where
    F: Fn(&ProcContext, &Captures, &mut dyn DirSink) -> Result<Fill> + Send + Sync,
{
    fn list(&self, ctx: &ProcContext, args: &Captures, sink: &mut dyn DirSink) -> Result<Fill> {
        self(ctx, args, sink)
    }
}

impl<F> LinkHandler for F
where
    F: Fn(&ProcContext, &Captures) -> Result<String> + Send + Sync,
{
    fn readlink(&self, ctx: &ProcContext, args: &Captures) -> Result<String> {
        self(ctx, args)
    }
}

/// Reports the default attributes for a node kind.
#[derive(Debug, Clone, Copy)]
pub struct DefaultAttr(pub NodeKind);

impl AttrHandler for DefaultAttr {
    fn getattr(&self, _ctx: &ProcContext, _args: &Captures) -> Result<NodeAttr> {
        Ok(match self.0 {
            NodeKind::File => NodeAttr::default_file(),
            NodeKind::Directory => NodeAttr::default_dir(),
            NodeKind::Symlink => NodeAttr::new_symlink(),
        })
    }
}

/// Listing stub for files and symlinks.
#[derive(Debug, Clone, Copy)]
pub struct NotADirectory;

impl ListHandler for NotADirectory {
    fn list(&self, _ctx: &ProcContext, args: &Captures, _sink: &mut dyn DirSink) -> Result<Fill> {
        Err(ProcfsError::NotADirectory {
            path: args.path().to_string(),
        })
    }
}

/// Read stub for directories.
#[derive(Debug, Clone, Copy)]
pub struct IsADirectory;

impl ReadHandler for IsADirectory {
    fn read(&self, _ctx: &ProcContext, args: &Captures, _: usize, _: u64) -> Result<Vec<u8>> {
        Err(ProcfsError::IsADirectory {
            path: args.path().to_string(),
        })
    }
}

/// Read stub for symlinks and readlink stub for everything that is not one.
#[derive(Debug, Clone, Copy)]
pub struct InvalidOperation;

impl ReadHandler for InvalidOperation {
    fn read(&self, _ctx: &ProcContext, args: &Captures, _: usize, _: u64) -> Result<Vec<u8>> {
        Err(ProcfsError::InvalidOperation {
            path: args.path().to_string(),
            op: "read",
        })
    }
}

impl LinkHandler for InvalidOperation {
    fn readlink(&self, _ctx: &ProcContext, args: &Captures) -> Result<String> {
        Err(ProcfsError::InvalidOperation {
            path: args.path().to_string(),
            op: "readlink",
        })
    }
}

/// Dynamic listing of a directory whose children are all static.
#[derive(Debug, Clone, Copy)]
pub struct NoDynamicEntries;

impl ListHandler for NoDynamicEntries {
    fn list(&self, _: &ProcContext, _: &Captures, _: &mut dyn DirSink) -> Result<Fill> {
        Ok(Fill::Done)
    }
}

/// Declaration of one route, before its pattern is compiled.
pub struct Route {
    pattern: String,
    arity: usize,
    kind: NodeKind,
    attr: Option<Arc<dyn AttrHandler>>,
    read: Option<Arc<dyn ReadHandler>>,
    list: Option<Arc<dyn ListHandler>>,
    link: Option<Arc<dyn LinkHandler>>,
    files: Vec<String>,
    dirs: Vec<String>,
    links: Vec<String>,
}

impl Route {
    fn new(pattern: &str, arity: usize, kind: NodeKind) -> Self {
        Route {
            pattern: pattern.to_string(),
            arity,
            kind,
            attr: None,
            read: None,
            list: None,
            link: None,
            files: Vec::new(),
            dirs: Vec::new(),
            links: Vec::new(),
        }
    }

    /// File route served by `read`.
    pub fn file(pattern: &str, arity: usize, read: impl ReadHandler + 'static) -> Self {
        let mut route = Self::new(pattern, arity, NodeKind::File);
        route.read = Some(Arc::new(read));
        route
    }

    /// A directory with no captures; use [`Route::arity`] for parameterised
    /// directories.
    pub fn dir(pattern: &str) -> Self {
        Self::new(pattern, 0, NodeKind::Directory)
    }

    /// Link route served by `link`.
    pub fn link(pattern: &str, arity: usize, link: impl LinkHandler + 'static) -> Self {
        let mut route = Self::new(pattern, arity, NodeKind::Symlink);
        route.link = Some(Arc::new(link));
        route
    }

    /// Override the declared capture count.
    pub fn arity(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    /// Override the attribute handler.
    pub fn attr(mut self, attr: impl AttrHandler + 'static) -> Self {
        self.attr = Some(Arc::new(attr));
        self
    }

    /// Bind the dynamic portion of a directory listing.
    pub fn list(mut self, list: impl ListHandler + 'static) -> Self {
        self.list = Some(Arc::new(list));
        self
    }

    /// Static file children.
    pub fn files(mut self, names: &[&str]) -> Self {
        self.files.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Static directory children.
    pub fn dirs(mut self, names: &[&str]) -> Self {
        self.dirs.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Static link children.
    pub fn links(mut self, names: &[&str]) -> Self {
        self.links.extend(names.iter().map(|n| n.to_string()));
        self
    }

    fn compile(self) -> std::result::Result<RouteEntry, RouteError> {
        if self.arity > MAX_ARITY {
            return Err(RouteError::ArityOutOfRange {
                pattern: self.pattern,
                arity: self.arity,
                max: MAX_ARITY,
            });
        }
        let regex = Regex::new(&format!("^(?:{})$", self.pattern)).map_err(|source| {
            RouteError::BadPattern {
                pattern: self.pattern.clone(),
                source,
            }
        })?;
        let actual = regex.captures_len() - 1;
        if actual != self.arity {
            return Err(RouteError::ArityMismatch {
                pattern: self.pattern,
                declared: self.arity,
                actual,
            });
        }

        let kind = self.kind;
        let attr: Arc<dyn AttrHandler> = match self.attr {
            Some(attr) => attr,
            None => Arc::new(DefaultAttr(kind)),
        };
        let read: Arc<dyn ReadHandler> = match kind {
            NodeKind::File => self.read.unwrap_or_else(|| Arc::new(InvalidOperation)),
            NodeKind::Directory => Arc::new(IsADirectory),
            NodeKind::Symlink => Arc::new(InvalidOperation),
        };
        let list: Arc<dyn ListHandler> = match kind {
            NodeKind::Directory => self.list.unwrap_or_else(|| Arc::new(NoDynamicEntries)),
            NodeKind::File | NodeKind::Symlink => Arc::new(NotADirectory),
        };
        let link: Arc<dyn LinkHandler> = match kind {
            NodeKind::Symlink => self.link.unwrap_or_else(|| Arc::new(InvalidOperation)),
            NodeKind::File | NodeKind::Directory => Arc::new(InvalidOperation),
        };

        Ok(RouteEntry {
            pattern: self.pattern,
            regex,
            arity: self.arity,
            kind,
            attr,
            read,
            list,
            link,
            files: self.files,
            dirs: self.dirs,
            links: self.links,
        })
    }
}

/// A compiled route.
pub struct RouteEntry {
    pattern: String,
    regex: Regex,
    arity: usize,
    kind: NodeKind,
    pub(crate) attr: Arc<dyn AttrHandler>,
    pub(crate) read: Arc<dyn ReadHandler>,
    pub(crate) list: Arc<dyn ListHandler>,
    pub(crate) link: Arc<dyn LinkHandler>,
    files: Vec<String>,
    dirs: Vec<String>,
    links: Vec<String>,
}

impl RouteEntry {
    /// Source of the pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Declared capture count.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Kind of node served.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Static file children.
    pub fn static_files(&self) -> &[String] {
        &self.files
    }

    /// Static directory children.
    pub fn static_dirs(&self) -> &[String] {
        &self.dirs
    }

    /// Static link children.
    pub fn static_links(&self) -> &[String] {
        &self.links
    }

    /// Full-string match of `path`, extracting exactly `arity` captures.
    pub fn matches(&self, path: &str) -> Option<Captures> {
        let caps = self.regex.captures(path)?;
        let values = (1..=self.arity)
            .map(|i| caps.get(i).map(|m| m.as_str()).unwrap_or("").to_string())
            .collect();
        Some(Captures::new(path, values))
    }
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("pattern", &self.pattern)
            .field("arity", &self.arity)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Ordered entries of one node kind.
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Entries in declaration order.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The file, directory and symlink tables.
#[derive(Debug, Default)]
pub struct RouteTables {
    /// File routes.
    pub files: RouteTable,
    /// Directory routes.
    pub dirs: RouteTable,
    /// Link routes.
    pub links: RouteTable,
}

impl RouteTables {
    /// Compile every declaration, keeping declaration order within each kind.
    pub fn build(routes: Vec<Route>) -> std::result::Result<Self, RouteError> {
        let mut tables = RouteTables::default();
        for route in routes {
            let entry = route.compile()?;
            match entry.kind {
                NodeKind::File => tables.files.entries.push(entry),
                NodeKind::Directory => tables.dirs.entries.push(entry),
                NodeKind::Symlink => tables.links.entries.push(entry),
            }
        }
        Ok(tables)
    }

    /// The table for `kind`.
    pub fn table(&self, kind: NodeKind) -> &RouteTable {
        match kind {
            NodeKind::File => &self.files,
            NodeKind::Directory => &self.dirs,
            NodeKind::Symlink => &self.links,
        }
    }

    /// Total routes over all tables.
    pub fn len(&self) -> usize {
        self.files.len() + self.dirs.len() + self.links.len()
    }

    /// Whether there are no routes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
