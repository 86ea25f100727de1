//! Daemon configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::filesystem::FilesystemConfig;
use crate::mount::MountOptions;

/// Daemon configuration, loaded from TOML or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcfsConfig {
    /// Where to mount.
    pub mountpoint: Option<PathBuf>,
    /// Options passed to the mount.
    pub mount: MountOptions,
    /// Attribute cache timeout in milliseconds.
    pub attr_timeout_ms: u64,
    /// Entry cache timeout in milliseconds.
    pub entry_timeout_ms: u64,
    /// Owner reported for every node. Defaults to the mounting user.
    pub uid: Option<u32>,
    /// Group reported for every node. Defaults to the mounting user's.
    pub gid: Option<u32>,
    /// Root of the process tree to serve.
    pub proc_root: PathBuf,
    /// Root of the sysfs tree for hardware.
    pub sys_root: PathBuf,
    /// Directory holding `passwd` and `group`.
    pub etc_root: PathBuf,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ProcfsConfig {
    fn default() -> Self {
        Self {
            mountpoint: None,
            mount: MountOptions::default(),
            attr_timeout_ms: 0,
            entry_timeout_ms: 0,
            uid: None,
            gid: None,
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
            etc_root: PathBuf::from("/etc"),
            log_level: String::from("info"),
        }
    }
}

impl ProcfsConfig {
    /// Load from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: ProcfsConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: ProcfsConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Adapter settings, filling unset ownership from the current process.
    pub fn filesystem_config(&self) -> FilesystemConfig {
        // SAFETY: getuid and getgid cannot fail.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        FilesystemConfig {
            uid: self.uid.unwrap_or(uid),
            gid: self.gid.unwrap_or(gid),
            attr_timeout: Duration::from_millis(self.attr_timeout_ms),
            entry_timeout: Duration::from_millis(self.entry_timeout_ms),
        }
    }
}
