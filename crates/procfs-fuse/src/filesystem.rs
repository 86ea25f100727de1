//! FUSE adapter.
//!
//! Implements the `fuser::Filesystem` trait on top of [`Procfs`]. The kernel
//! speaks in inode numbers; every request is translated to the path the
//! inode stands for and answered by the path-based operations. Nothing is
//! cached: attribute and entry timeouts default to zero and files are opened
//! with direct I/O so every read reaches the handlers.

use std::ffi::OsStr;
use std::os::raw::c_int;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use fuser::{
    consts::FOPEN_DIRECT_IO, FileAttr, FileType as FuserFileType, Filesystem, KernelConfig,
    ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, Request,
};
use tracing::{debug, info};

use crate::attr::{node_kind_to_fuser_type, NodeKind};
use crate::compose::DirSink;
use crate::error::{ProcfsError, Result};
use crate::facade::Procfs;
use crate::inode::{child_path, InodeId, PathInodes, UNKNOWN_INODE};

/// Settings of the FUSE adapter.
#[derive(Debug, Clone)]
pub struct FilesystemConfig {
    /// Owner reported for every node.
    pub uid: u32,
    /// Group reported for every node.
    pub gid: u32,
    /// How long the kernel may cache attributes.
    pub attr_timeout: Duration,
    /// How long the kernel may cache lookups.
    pub entry_timeout: Duration,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            uid: 0,
            gid: 0,
            attr_timeout: Duration::ZERO,
            entry_timeout: Duration::ZERO,
        }
    }
}

struct FsState {
    inodes: PathInodes,
}

/// FUSE adapter over [`Procfs`].
pub struct ProcFilesystem {
    procfs: Procfs,
    config: FilesystemConfig,
    state: Arc<Mutex<FsState>>,
}

/// Directory sink that skips the first `skip` entries and hands the rest to
/// `add` with their one-based position as the resume offset.
struct OffsetSink<'a, F> {
    inodes: &'a PathInodes,
    dir: &'a str,
    skip: i64,
    position: i64,
    add: F,
}

impl<F> DirSink for OffsetSink<'_, F>
where
    F: FnMut(InodeId, i64, FuserFileType, &str) -> bool,
{
    fn push(&mut self, name: &str, kind: NodeKind) -> bool {
        self.position += 1;
        if self.position <= self.skip {
            return true;
        }
        let ino = child_path(self.dir, name)
            .and_then(|path| self.inodes.ino_of(&path))
            .unwrap_or(UNKNOWN_INODE);
        let full = (self.add)(ino, self.position, node_kind_to_fuser_type(kind), name);
        !full
    }
}

impl ProcFilesystem {
    /// Wrap `procfs` for mounting.
    pub fn new(procfs: Procfs, config: FilesystemConfig) -> Self {
        Self {
            procfs,
            config,
            state: Arc::new(Mutex::new(FsState {
                inodes: PathInodes::new(),
            })),
        }
    }

    /// Adapter settings.
    pub fn config(&self) -> &FilesystemConfig {
        &self.config
    }

    fn state(&self) -> Result<MutexGuard<'_, FsState>> {
        self.state
            .lock()
            .map_err(|_| ProcfsError::unavailable("inode table poisoned"))
    }

    fn path_of(&self, ino: InodeId) -> Result<String> {
        let state = self.state()?;
        state
            .inodes
            .path(ino)
            .map(str::to_string)
            .ok_or_else(|| ProcfsError::no_such_entry(format!("inode {}", ino)))
    }

    fn attr_at(&self, ino: InodeId, path: &str) -> Result<FileAttr> {
        let attr = self.procfs.getattr(path)?;
        Ok(attr.to_fuser(ino, self.config.uid, self.config.gid))
    }

    fn lookup_entry(&self, parent: InodeId, name: &str) -> Result<FileAttr> {
        let parent_path = self.path_of(parent)?;
        let path = child_path(&parent_path, name)
            .ok_or_else(|| ProcfsError::no_such_entry(name.to_string()))?;
        let attr = self.procfs.getattr(&path)?;
        let ino = self.state()?.inodes.lookup(&path);
        Ok(attr.to_fuser(ino, self.config.uid, self.config.gid))
    }

    fn getattr_ino(&self, ino: InodeId) -> Result<FileAttr> {
        let path = self.path_of(ino)?;
        self.attr_at(ino, &path)
    }

    fn open_file(&self, ino: InodeId, flags: i32) -> Result<()> {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(ProcfsError::InvalidOperation {
                path: format!("inode {}", ino),
                op: "write",
            });
        }
        let path = self.path_of(ino)?;
        match self.procfs.getattr(&path)?.kind {
            NodeKind::Directory => Err(ProcfsError::IsADirectory { path }),
            NodeKind::File | NodeKind::Symlink => Ok(()),
        }
    }

    fn open_dir(&self, ino: InodeId) -> Result<()> {
        let path = self.path_of(ino)?;
        match self.procfs.getattr(&path)?.kind {
            NodeKind::Directory => Ok(()),
            NodeKind::File | NodeKind::Symlink => Err(ProcfsError::NotADirectory { path }),
        }
    }

    fn read_ino(&self, ino: InodeId, offset: i64, size: u32) -> Result<Vec<u8>> {
        let path = self.path_of(ino)?;
        self.procfs.read(&path, size as usize, offset.max(0) as u64)
    }

    fn readlink_ino(&self, ino: InodeId) -> Result<String> {
        let path = self.path_of(ino)?;
        self.procfs.readlink(&path)
    }

    /// Re-run the listing for `ino`, emitting entries after `offset`.
    fn list_ino<F>(&self, ino: InodeId, offset: i64, add: F) -> Result<()>
    where
        F: FnMut(InodeId, i64, FuserFileType, &str) -> bool,
    {
        let path = self.path_of(ino)?;
        let state = self.state()?;
        let mut sink = OffsetSink {
            inodes: &state.inodes,
            dir: &path,
            skip: offset,
            position: 0,
            add,
        };
        self.procfs.list(&path, &mut sink)?;
        Ok(())
    }
}

impl Filesystem for ProcFilesystem {
    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut KernelConfig,
    ) -> std::result::Result<(), c_int> {
        info!("procfs mounted, {} routes", self.procfs.tables().len());
        Ok(())
    }

    fn destroy(&mut self) {
        info!("procfs unmounted");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name_str = name.to_string_lossy();
        debug!("lookup parent={} name={}", parent, name_str);
        match self.lookup_entry(parent, &name_str) {
            Ok(attr) => reply.entry(&self.config.entry_timeout, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        debug!("forget ino={} nlookup={}", ino, nlookup);
        if let Ok(mut state) = self.state() {
            state.inodes.forget(ino, nlookup);
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        debug!("getattr ino={}", ino);
        match self.getattr_ino(ino) {
            Ok(attr) => reply.attr(&self.config.attr_timeout, &attr),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        debug!("readlink ino={}", ino);
        match self.readlink_ino(ino) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open ino={} flags={}", ino, flags);
        match self.open_file(ino, flags) {
            Ok(()) => reply.opened(0, FOPEN_DIRECT_IO),
            Err(ProcfsError::InvalidOperation { .. }) => reply.error(libc::EROFS),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read ino={} offset={} size={}", ino, offset, size);
        match self.read_ino(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("opendir ino={}", ino);
        match self.open_dir(ino) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir ino={} offset={}", ino, offset);
        let result = self.list_ino(ino, offset, |child, off, kind, name| {
            reply.add(child, off, kind, name)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        debug!("statfs");
        let files = self.state().map(|s| s.inodes.len() as u64).unwrap_or(0);
        reply.statfs(0, 0, 0, files, 0, 4096, 255, 4096);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::ROOT_INODE;
    use crate::testing::{mock_context, MockHardware, MockIntrospector, MockProcess};

    fn make_fs() -> (ProcFilesystem, Arc<MockIntrospector>) {
        let mock = Arc::new(MockIntrospector::new());
        mock.add_process(MockProcess::new(1, "init"));
        mock.add_process(MockProcess::new(42, "shell").with_cmdline(&["sh", "-i"]));
        let ctx = mock_context(mock.clone(), MockHardware::new(2));
        let procfs = Procfs::with_default_routes(ctx).unwrap();
        (ProcFilesystem::new(procfs, FilesystemConfig::default()), mock)
    }

    fn collect(fs: &ProcFilesystem, ino: InodeId, offset: i64) -> Vec<(String, i64, InodeId)> {
        let mut out = Vec::new();
        fs.list_ino(ino, offset, |child, off, _kind, name| {
            out.push((name.to_string(), off, child));
            false
        })
        .unwrap();
        out
    }

    #[test]
    fn test_default_config_has_no_caching() {
        let config = FilesystemConfig::default();
        assert_eq!(config.attr_timeout, Duration::ZERO);
        assert_eq!(config.entry_timeout, Duration::ZERO);
    }

    #[test]
    fn test_root_attr() {
        let (fs, _) = make_fs();
        let attr = fs.getattr_ino(ROOT_INODE).unwrap();
        assert_eq!(attr.ino, ROOT_INODE);
        assert_eq!(attr.kind, FuserFileType::Directory);
        assert_eq!(attr.perm, 0o555);
    }

    #[test]
    fn test_lookup_allocates_inode() {
        let (fs, _) = make_fs();
        let dir = fs.lookup_entry(ROOT_INODE, "42").unwrap();
        assert_eq!(dir.kind, FuserFileType::Directory);
        assert_ne!(dir.ino, ROOT_INODE);

        let file = fs.lookup_entry(dir.ino, "cmdline").unwrap();
        assert_eq!(file.kind, FuserFileType::RegularFile);
        assert_eq!(fs.path_of(file.ino).unwrap(), "/42/cmdline");

        let again = fs.lookup_entry(ROOT_INODE, "42").unwrap();
        assert_eq!(again.ino, dir.ino);
    }

    #[test]
    fn test_lookup_missing_process() {
        let (fs, _) = make_fs();
        let err = fs.lookup_entry(ROOT_INODE, "77").unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
        let err = fs.lookup_entry(ROOT_INODE, "nonsense").unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_unknown_inode_is_enoent() {
        let (fs, _) = make_fs();
        assert_eq!(fs.getattr_ino(999).unwrap_err().to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_read_through_inode() {
        let (fs, _) = make_fs();
        let dir = fs.lookup_entry(ROOT_INODE, "42").unwrap();
        let file = fs.lookup_entry(dir.ino, "cmdline").unwrap();
        assert_eq!(fs.read_ino(file.ino, 0, 4096).unwrap(), b"sh -i\n");
        assert_eq!(fs.read_ino(file.ino, 3, 2).unwrap(), b"-i");
        assert!(fs.read_ino(file.ino, 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_read_after_process_exit() {
        let (fs, mock) = make_fs();
        let dir = fs.lookup_entry(ROOT_INODE, "42").unwrap();
        let file = fs.lookup_entry(dir.ino, "ppid").unwrap();
        mock.remove_process(42);
        assert_eq!(
            fs.read_ino(file.ino, 0, 4096).unwrap_err().to_errno(),
            libc::ENOENT
        );
    }

    #[test]
    fn test_readlink_through_inode() {
        let (fs, _) = make_fs();
        let dir = fs.lookup_entry(ROOT_INODE, "42").unwrap();
        let link = fs.lookup_entry(dir.ino, "exe").unwrap();
        assert_eq!(link.kind, FuserFileType::Symlink);
        assert_eq!(fs.readlink_ino(link.ino).unwrap(), "/usr/bin/shell");
    }

    #[test]
    fn test_open_rules() {
        let (fs, _) = make_fs();
        let dir = fs.lookup_entry(ROOT_INODE, "42").unwrap();
        let file = fs.lookup_entry(dir.ino, "comm").unwrap();
        assert!(fs.open_file(file.ino, libc::O_RDONLY).is_ok());
        assert!(fs.open_file(file.ino, libc::O_WRONLY).is_err());
        assert_eq!(
            fs.open_file(dir.ino, libc::O_RDONLY).unwrap_err().to_errno(),
            libc::EISDIR
        );
        assert!(fs.open_dir(dir.ino).is_ok());
        assert_eq!(fs.open_dir(file.ino).unwrap_err().to_errno(), libc::ENOTDIR);
    }

    #[test]
    fn test_readdir_offsets() {
        let (fs, _) = make_fs();
        let all = collect(&fs, ROOT_INODE, 0);
        let names: Vec<&str> = all.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec![".", "..", "1", "42", "hardware"]);
        let offsets: Vec<i64> = all.iter().map(|(_, o, _)| *o).collect();
        assert_eq!(offsets, vec![1, 2, 3, 4, 5]);
        assert_eq!(all[0].2, ROOT_INODE);

        let rest = collect(&fs, ROOT_INODE, 3);
        let names: Vec<&str> = rest.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["42", "hardware"]);
        assert!(collect(&fs, ROOT_INODE, 5).is_empty());
    }

    #[test]
    fn test_readdir_reports_known_inodes() {
        let (fs, _) = make_fs();
        let dir = fs.lookup_entry(ROOT_INODE, "42").unwrap();
        let all = collect(&fs, ROOT_INODE, 0);
        let (_, _, ino) = all.iter().find(|(n, _, _)| n == "42").unwrap();
        assert_eq!(*ino, dir.ino);
        let (_, _, ino) = all.iter().find(|(n, _, _)| n == "1").unwrap();
        assert_eq!(*ino, UNKNOWN_INODE);
    }

    #[test]
    fn test_readdir_stops_when_full() {
        let (fs, _) = make_fs();
        let mut seen = Vec::new();
        fs.list_ino(ROOT_INODE, 0, |_, _, _, name| {
            seen.push(name.to_string());
            seen.len() == 2
        })
        .unwrap();
        assert_eq!(seen, vec![".", ".."]);
    }

    #[test]
    fn test_readdir_of_file_fails() {
        let (fs, _) = make_fs();
        let dir = fs.lookup_entry(ROOT_INODE, "42").unwrap();
        let file = fs.lookup_entry(dir.ino, "comm").unwrap();
        let err = fs.list_ino(file.ino, 0, |_, _, _, _| false).unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOTDIR);
    }
}
