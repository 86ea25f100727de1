//! Mount point management.
//!
//! Option parsing, mount validation and the RAII handle that unmounts when
//! dropped. The filesystem is always mounted read-only.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::filesystem::ProcFilesystem;

/// Mount options for FUSE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOptions {
    /// Allow other users to access.
    pub allow_other: bool,
    /// Allow root to access.
    pub allow_root: bool,
    /// Use default permissions.
    pub default_permissions: bool,
    /// Auto unmount on exit. Needs allow_other or allow_root.
    pub auto_unmount: bool,
    /// Bypass page cache.
    pub direct_io: bool,
    /// Name shown in the mount table.
    pub fsname: String,
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions {
            allow_other: false,
            allow_root: false,
            default_permissions: true,
            auto_unmount: false,
            direct_io: true,
            fsname: "procfs".to_string(),
        }
    }
}

/// Errors that can occur during mount operations.
#[derive(Debug, Error)]
pub enum MountError {
    /// The mountpoint does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// The mountpoint is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Access to the mountpoint was denied.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// An unknown or forbidden mount option.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for MountError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => MountError::PathNotFound(e.to_string()),
            std::io::ErrorKind::PermissionDenied => MountError::PermissionDenied(e.to_string()),
            _ => MountError::IoError(e.to_string()),
        }
    }
}

/// Validate a mountpoint path.
pub fn validate_mountpoint(path: &Path) -> Result<(), MountError> {
    if !path.exists() {
        return Err(MountError::PathNotFound(path.display().to_string()));
    }

    if !path.is_dir() {
        return Err(MountError::NotADirectory(path.display().to_string()));
    }

    Ok(())
}

/// Apply comma-separated `-o` options on top of `base`.
///
/// Valid options: allow_other, allow_root, default_permissions, auto_unmount,
/// noauto_unmount, direct_io, fsname=NAME, ro. `rw` is rejected.
pub fn apply_mount_options(
    base: MountOptions,
    opts_str: &str,
) -> Result<MountOptions, MountError> {
    let mut options = base;

    for opt in opts_str.split(',') {
        let opt = opt.trim();
        match opt {
            "allow_other" => options.allow_other = true,
            "allow_root" => options.allow_root = true,
            "default_permissions" => options.default_permissions = true,
            "auto_unmount" => options.auto_unmount = true,
            "noauto_unmount" => options.auto_unmount = false,
            "direct_io" => options.direct_io = true,
            "ro" | "" => {}
            _ => match opt.strip_prefix("fsname=") {
                Some(name) if !name.is_empty() => options.fsname = name.to_string(),
                _ => return Err(MountError::InvalidOption(opt.to_string())),
            },
        }
    }

    Ok(options)
}

/// Parse mount options from a comma-separated string.
pub fn parse_mount_options(opts_str: &str) -> Result<MountOptions, MountError> {
    apply_mount_options(MountOptions::default(), opts_str)
}

/// Convert MountOptions to fuser::MountOption vec.
pub fn options_to_fuser(opts: &MountOptions) -> Vec<fuser::MountOption> {
    let mut fuser_opts = vec![
        fuser::MountOption::RO,
        fuser::MountOption::FSName(opts.fsname.clone()),
        fuser::MountOption::Subtype("procfs".to_string()),
    ];

    if opts.allow_other {
        fuser_opts.push(fuser::MountOption::AllowOther);
    }

    if opts.allow_root {
        fuser_opts.push(fuser::MountOption::AllowRoot);
    }

    if opts.default_permissions {
        fuser_opts.push(fuser::MountOption::DefaultPermissions);
    }

    if opts.auto_unmount {
        fuser_opts.push(fuser::MountOption::AutoUnmount);
    }

    if opts.direct_io {
        fuser_opts.push(fuser::MountOption::CUSTOM("direct_io".into()));
    }

    fuser_opts
}

/// RAII handle for a mounted filesystem. Dropping it unmounts.
pub struct MountHandle {
    mountpoint: PathBuf,
    session: Option<fuser::BackgroundSession>,
}

impl MountHandle {
    /// Validate `mountpoint` and mount `fs` on a background thread.
    pub fn mount(
        fs: ProcFilesystem,
        mountpoint: &Path,
        opts: &MountOptions,
    ) -> Result<Self, MountError> {
        validate_mountpoint(mountpoint)?;
        let session = fuser::spawn_mount2(fs, mountpoint, &options_to_fuser(opts))?;
        info!("mounted at {}", mountpoint.display());
        Ok(MountHandle {
            mountpoint: mountpoint.to_path_buf(),
            session: Some(session),
        })
    }

    /// Where the filesystem is mounted.
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Whether the session is still running.
    pub fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    /// Unmount and wait for the session to end.
    pub fn unmount(&mut self) {
        if let Some(session) = self.session.take() {
            info!("unmounting {}", self.mountpoint.display());
            session.join();
        }
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountHandle")
            .field("mountpoint", &self.mountpoint)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}
