//! Mapping between kernel inode numbers and filesystem paths.
//!
//! Nodes are synthesized on demand, so an inode is nothing more than a stable
//! name for a path the kernel has looked up. Numbers are handed out on first
//! lookup and dropped when the kernel forgets them.

use std::collections::HashMap;

/// Inode number handed to the kernel.
pub type InodeId = u64;
/// Inode of the mount root.
pub const ROOT_INODE: InodeId = 1;

/// Inode reported for directory entries the kernel has not looked up yet.
pub const UNKNOWN_INODE: InodeId = 0xffff_ffff;

#[derive(Debug, Clone)]
struct InodeEntry {
    path: String,
    lookup_count: u64,
}

/// Bidirectional map between paths and inode numbers.
#[derive(Debug)]
pub struct PathInodes {
    entries: HashMap<InodeId, InodeEntry>,
    by_path: HashMap<String, InodeId>,
    next_ino: InodeId,
}

/// Join a directory path and an entry name. `None` if `name` cannot be a
/// single path component.
pub fn child_path(parent: &str, name: &str) -> Option<String> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return None;
    }
    match name {
        "." => Some(parent.to_string()),
        ".." => Some(parent_path(parent).to_string()),
        _ if parent == "/" => Some(format!("/{}", name)),
        _ => Some(format!("{}/{}", parent, name)),
    }
}

/// Parent directory of a normalized path.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

impl PathInodes {
    /// Table holding only the root.
    pub fn new() -> Self {
        let mut table = PathInodes {
            entries: HashMap::new(),
            by_path: HashMap::new(),
            next_ino: ROOT_INODE + 1,
        };
        table.entries.insert(
            ROOT_INODE,
            InodeEntry {
                path: "/".to_string(),
                lookup_count: 1,
            },
        );
        table.by_path.insert("/".to_string(), ROOT_INODE);
        table
    }

    /// Path of `ino`, if known.
    pub fn path(&self, ino: InodeId) -> Option<&str> {
        self.entries.get(&ino).map(|e| e.path.as_str())
    }

    /// Inode already assigned to `path`.
    pub fn ino_of(&self, path: &str) -> Option<InodeId> {
        self.by_path.get(path).copied()
    }

    /// Record one kernel lookup of `path`, allocating an inode if needed.
    pub fn lookup(&mut self, path: &str) -> InodeId {
        if let Some(&ino) = self.by_path.get(path) {
            if let Some(entry) = self.entries.get_mut(&ino) {
                entry.lookup_count += 1;
            }
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.entries.insert(
            ino,
            InodeEntry {
                path: path.to_string(),
                lookup_count: 1,
            },
        );
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    /// Outstanding kernel references to `ino`.
    pub fn lookup_count(&self, ino: InodeId) -> u64 {
        self.entries.get(&ino).map(|e| e.lookup_count).unwrap_or(0)
    }

    /// Drop `n` kernel references to `ino`.
    pub fn forget(&mut self, ino: InodeId, n: u64) {
        if ino == ROOT_INODE {
            return;
        }
        let should_remove = if let Some(entry) = self.entries.get_mut(&ino) {
            entry.lookup_count = entry.lookup_count.saturating_sub(n);
            entry.lookup_count == 0
        } else {
            false
        };
        if should_remove {
            if let Some(entry) = self.entries.remove(&ino) {
                self.by_path.remove(&entry.path);
            }
        }
    }

    /// Number of known inodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no inode is known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PathInodes {
    fn default() -> Self {
        Self::new()
    }
}
