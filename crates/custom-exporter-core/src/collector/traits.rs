//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The shell backend needs two things from the filesystem: `PATH` lookups for
//! executables and `/etc/passwd` for resolving the system user commands run
//! as. The `FileSystem` trait lets both run against the real filesystem or
//! against [`MockFs`](super::mock::MockFs) in tests.

use std::io;
use std::path::Path;

/// Abstraction for the filesystem operations used by collectors.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Returns `true` if `path` is a regular file the exporter may execute.
    fn is_executable(&self, path: &Path) -> bool;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    #[cfg(unix)]
    fn is_executable(&self, path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_executable(&self, path: &Path) -> bool {
        path.is_file()
    }
}
