//! In-memory mock filesystem for testing executable lookup and user resolution.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Stores files in memory together with an executable flag, so `PATH`
/// resolution and `/etc/passwd` parsing can be exercised without touching the
/// host system.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Files carrying an execute permission bit.
    executables: HashSet<PathBuf>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files.insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Adds an executable file (empty content).
    pub fn add_executable(&mut self, path: impl AsRef<Path>) {
        self.add_file(path.as_ref(), "");
        self.executables.insert(path.as_ref().to_path_buf());
    }

    /// A filesystem with a handful of `/usr/bin` tools and an `/etc/passwd`.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();
        for tool in ["cat", "echo", "grep", "sort", "printf"] {
            fs.add_executable(Path::new("/usr/bin").join(tool));
        }
        fs.add_executable("/bin/sh");
        fs.add_file(
            "/etc/passwd",
            "root:x:0:0:root:/root:/bin/bash\n\
             # service accounts\n\
             nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin\n\
             probe:x:1001:1002::/home/probe:/bin/sh\n",
        );
        fs
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn is_executable(&self, path: &Path) -> bool {
        self.executables.contains(path)
    }
}
