//! Node attributes and their FUSE form.

use std::time::SystemTime;

/// The three node shapes a route can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

/// Attributes reported for a synthetic node. Inode numbers and ownership are
/// filled in by the FUSE adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeAttr {
    /// Shape of the node.
    pub kind: NodeKind,
    /// Size in bytes.
    pub size: u64,
    /// Permission bits.
    pub perm: u16,
    /// Link count.
    pub nlink: u32,
    /// Last access time.
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
}

impl NodeAttr {
    /// Regular file of `size` bytes.
    pub fn new_file(size: u64, perm: u16) -> Self {
        let now = SystemTime::now();
        NodeAttr {
            kind: NodeKind::File,
            size,
            perm,
            nlink: 1,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    /// Directory with the given permissions.
    pub fn new_dir(perm: u16) -> Self {
        let now = SystemTime::now();
        NodeAttr {
            kind: NodeKind::Directory,
            size: 0,
            perm,
            nlink: 1,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    /// Symbolic link.
    pub fn new_symlink() -> Self {
        NodeAttr {
            kind: NodeKind::Symlink,
            size: 0,
            perm: 0o755,
            nlink: 1,
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
        }
    }

    /// Read-only file with unknown size.
    pub fn default_file() -> Self {
        Self::new_file(0, 0o444)
    }

    /// Read-only directory.
    pub fn default_dir() -> Self {
        Self::new_dir(0o555)
    }

    /// Convert to the attributes handed to the kernel.
    pub fn to_fuser(&self, ino: u64, uid: u32, gid: u32) -> fuser::FileAttr {
        fuser::FileAttr {
            ino,
            size: self.size,
            blocks: blocks_for_size(self.size),
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            crtime: SystemTime::UNIX_EPOCH,
            kind: node_kind_to_fuser_type(self.kind),
            perm: self.perm,
            nlink: self.nlink,
            uid,
            gid,
            rdev: 0,
            blksize: 4096,
            flags: 0,
        }
    }
}

fn blocks_for_size(size: u64) -> u64 {
    size.div_ceil(512)
}

/// Map a node kind to its FUSE file type.
pub fn node_kind_to_fuser_type(kind: NodeKind) -> fuser::FileType {
    match kind {
        NodeKind::File => fuser::FileType::RegularFile,
        NodeKind::Directory => fuser::FileType::Directory,
        NodeKind::Symlink => fuser::FileType::Symlink,
    }
}
