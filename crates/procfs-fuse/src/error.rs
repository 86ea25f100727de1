//! Error types.

use thiserror::Error;

/// Outcome taxonomy of every filesystem operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcfsError {
    /// Nothing lives at this path.
    #[error("No such entry: {path}")]
    NoSuchEntry { path: String },

    /// A directory operation on a non-directory.
    #[error("Not a directory: {path}")]
    NotADirectory { path: String },

    /// A file operation on a directory.
    #[error("Is a directory: {path}")]
    IsADirectory { path: String },

    /// The operation does not apply to this node.
    #[error("Invalid operation {op} on {path}")]
    InvalidOperation { path: String, op: &'static str },

    /// The backend could not answer.
    #[error("Introspection unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Result alias for filesystem operations.
pub type Result<T> = std::result::Result<T, ProcfsError>;

impl ProcfsError {
    /// Shorthand for [`ProcfsError::NoSuchEntry`].
    pub fn no_such_entry(path: impl Into<String>) -> Self {
        ProcfsError::NoSuchEntry { path: path.into() }
    }

    /// Shorthand for [`ProcfsError::Unavailable`].
    pub fn unavailable(reason: impl Into<String>) -> Self {
        ProcfsError::Unavailable {
            reason: reason.into(),
        }
    }

    /// Errno reported to the kernel.
    pub fn to_errno(&self) -> i32 {
        use libc::*;
        match self {
            ProcfsError::NoSuchEntry { .. } => ENOENT,
            ProcfsError::NotADirectory { .. } => ENOTDIR,
            ProcfsError::IsADirectory { .. } => EISDIR,
            ProcfsError::InvalidOperation { .. } => EINVAL,
            ProcfsError::Unavailable { .. } => EIO,
        }
    }
}

impl From<std::io::Error> for ProcfsError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            // A /proc entry that disappears means the target exited.
            std::io::ErrorKind::NotFound => ProcfsError::NoSuchEntry {
                path: e.to_string(),
            },
            _ if e.raw_os_error() == Some(libc::ESRCH) => ProcfsError::NoSuchEntry {
                path: e.to_string(),
            },
            _ => ProcfsError::Unavailable {
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(target_os = "linux")]
impl From<procfs::ProcError> for ProcfsError {
    fn from(e: procfs::ProcError) -> Self {
        match e {
            procfs::ProcError::NotFound(path) => ProcfsError::NoSuchEntry {
                path: path.map(|p| p.display().to_string()).unwrap_or_default(),
            },
            other => ProcfsError::Unavailable {
                reason: other.to_string(),
            },
        }
    }
}

/// Errors raised while compiling the route tables at startup.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The pattern does not compile.
    #[error("Invalid pattern {pattern}: {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// More capture groups than routes may have.
    #[error("Arity {arity} out of range for {pattern} (maximum {max})")]
    ArityOutOfRange {
        pattern: String,
        arity: usize,
        max: usize,
    },

    /// Declared and actual capture counts differ.
    #[error("Pattern {pattern} declares arity {declared} but has {actual} capture groups")]
    ArityMismatch {
        pattern: String,
        declared: usize,
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_such_entry_errno() {
        let err = ProcfsError::no_such_entry("/42");
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_not_a_directory_errno() {
        let err = ProcfsError::NotADirectory {
            path: "/1/cmdline".to_string(),
        };
        assert_eq!(err.to_errno(), libc::ENOTDIR);
    }

    #[test]
    fn test_is_a_directory_errno() {
        let err = ProcfsError::IsADirectory {
            path: "/1/task".to_string(),
        };
        assert_eq!(err.to_errno(), libc::EISDIR);
    }

    #[test]
    fn test_invalid_operation_errno() {
        let err = ProcfsError::InvalidOperation {
            path: "/1/cmdline".to_string(),
            op: "readlink",
        };
        assert_eq!(err.to_errno(), libc::EINVAL);
    }

    #[test]
    fn test_unavailable_errno() {
        let err = ProcfsError::unavailable("task_info failed");
        assert_eq!(err.to_errno(), libc::EIO);
    }

    #[test]
    fn test_io_not_found_maps_to_no_such_entry() {
        let io_err = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(matches!(
            ProcfsError::from(io_err),
            ProcfsError::NoSuchEntry { .. }
        ));
    }

    #[test]
    fn test_io_esrch_maps_to_no_such_entry() {
        let io_err = std::io::Error::from_raw_os_error(libc::ESRCH);
        assert!(matches!(
            ProcfsError::from(io_err),
            ProcfsError::NoSuchEntry { .. }
        ));
    }

    #[test]
    fn test_io_permission_denied_maps_to_unavailable() {
        let io_err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(ProcfsError::from(io_err).to_errno(), libc::EIO);
    }

    #[test]
    fn test_display_messages_non_empty() {
        let errors = [
            ProcfsError::no_such_entry("/1"),
            ProcfsError::NotADirectory {
                path: "/1/ppid".to_string(),
            },
            ProcfsError::IsADirectory {
                path: "/1".to_string(),
            },
            ProcfsError::InvalidOperation {
                path: "/1".to_string(),
                op: "read",
            },
            ProcfsError::unavailable("boom"),
        ];
        for err in errors {
            assert!(!err.to_string().is_empty(), "Error display should be non-empty");
        }
    }

    #[test]
    fn test_route_error_display() {
        let err = RouteError::ArityMismatch {
            pattern: "/(\\d+)".to_string(),
            declared: 2,
            actual: 1,
        };
        assert!(err.to_string().contains("arity 2"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_proc_error_mapping() {
        let gone = procfs::ProcError::NotFound(Some("/proc/42/stat".into()));
        assert!(matches!(
            ProcfsError::from(gone),
            ProcfsError::NoSuchEntry { path } if path == "/proc/42/stat"
        ));
        let denied = procfs::ProcError::PermissionDenied(None);
        assert!(matches!(
            ProcfsError::from(denied),
            ProcfsError::Unavailable { .. }
        ));
    }
}
