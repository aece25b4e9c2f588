use std::fmt;
use std::path::{Path, PathBuf};

/// Classified change for a single path inside a watched directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    /// Moved into the watched directory
    Renamed,
}

impl ChangeKind {
    /// Created, modified and moved-in files are "arrived"; deletions are "departed"
    pub fn is_arrival(&self) -> bool {
        !matches!(self, ChangeKind::Deleted)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
        };
        f.write_str(s)
    }
}

/// File-level event forwarded to the recovery coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, the identity used for backup correlation
    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
    }
}
