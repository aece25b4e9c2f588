//! Granted hierarchical access handles
//!
//! A granted tree is reached only by walking name segments from its root;
//! entries are never addressed by path directly.

use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;

use url::Url;

use super::AccessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// One node of a granted tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Backend-specific document id
    document: PathBuf,
}

impl TreeEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Capability allowing hierarchical lookup into an otherwise unreadable tree
pub trait GrantedTree: Send + Sync + std::fmt::Debug {
    fn root(&self) -> Result<TreeEntry, AccessError>;

    /// Immediate children of a directory entry, in no particular order
    fn children(&self, dir: &TreeEntry) -> Result<Vec<TreeEntry>, AccessError>;

    /// Open a file entry for streamed reading
    fn open(&self, file: &TreeEntry) -> Result<Box<dyn Read + Send>, AccessError>;
}

/// Walk `segments` from the tree root down to a readable leaf
///
/// Each segment is matched by exact name; the first match wins.
pub fn resolve<S: AsRef<str>>(
    tree: &dyn GrantedTree,
    segments: &[S],
) -> Result<TreeEntry, AccessError> {
    let mut current = tree.root()?;

    for segment in segments {
        let segment = segment.as_ref();
        if !current.is_dir() {
            return Err(AccessError::PermissionDenied(format!(
                "{} is not a directory in the granted tree",
                current.name
            )));
        }

        current = tree
            .children(&current)?
            .into_iter()
            .find(|child| child.name == segment)
            .ok_or_else(|| {
                AccessError::PermissionDenied(format!(
                    "{} is not reachable through the granted tree",
                    segment
                ))
            })?;
    }

    if current.is_dir() {
        return Err(AccessError::PermissionDenied(format!(
            "{} is a directory, not a readable file",
            current.name
        )));
    }

    Ok(current)
}

/// Granted tree backed by a mounted directory, persisted as a `file://` URI
#[derive(Debug, Clone)]
pub struct MountedTree {
    root: PathBuf,
}

impl MountedTree {
    /// Parse a persisted grant; anything unusable is a permission failure
    pub fn from_uri(uri: &str) -> Result<Self, AccessError> {
        let url = Url::parse(uri.trim())
            .map_err(|e| AccessError::PermissionDenied(format!("Invalid grant URI: {}", e)))?;

        if url.scheme() != "file" {
            return Err(AccessError::PermissionDenied(format!(
                "Unsupported grant scheme: {}",
                url.scheme()
            )));
        }

        let root = url
            .to_file_path()
            .map_err(|_| AccessError::PermissionDenied(format!("Grant URI has no local path: {}", uri)))?;

        if !root.is_dir() {
            return Err(AccessError::PermissionDenied(format!(
                "Granted directory is unavailable: {}",
                root.display()
            )));
        }

        Ok(Self { root })
    }

    /// URI form stored in preferences
    pub fn to_uri(&self) -> Option<String> {
        Url::from_directory_path(&self.root)
            .ok()
            .map(|u| u.to_string())
    }
}

impl GrantedTree for MountedTree {
    fn root(&self) -> Result<TreeEntry, AccessError> {
        if !self.root.is_dir() {
            return Err(AccessError::PermissionDenied(format!(
                "Granted directory is unavailable: {}",
                self.root.display()
            )));
        }

        Ok(TreeEntry {
            name: String::new(),
            kind: EntryKind::Directory,
            document: self.root.clone(),
        })
    }

    fn children(&self, dir: &TreeEntry) -> Result<Vec<TreeEntry>, AccessError> {
        let entries = fs::read_dir(&dir.document).map_err(|e| {
            AccessError::PermissionDenied(format!("Cannot list {}: {}", dir.name, e))
        })?;

        Ok(entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let file_type = entry.file_type().ok()?;
                let kind = if file_type.is_dir() {
                    EntryKind::Directory
                } else if file_type.is_file() {
                    EntryKind::File
                } else {
                    return None;
                };
                Some(TreeEntry {
                    name: entry.file_name().to_string_lossy().to_string(),
                    kind,
                    document: entry.path(),
                })
            })
            .collect())
    }

    fn open(&self, file: &TreeEntry) -> Result<Box<dyn Read + Send>, AccessError> {
        let handle = File::open(&file.document).map_err(|e| {
            AccessError::PermissionDenied(format!("Cannot open {}: {}", file.name, e))
        })?;
        Ok(Box::new(handle))
    }
}
