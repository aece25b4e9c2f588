use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use super::grant::GrantStore;
use super::tree;
use crate::config::{EngineConfig, Platform};
use crate::models::AccessMode;

/// Typed outcome of a failed resolution. Resolution never panics past this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Granted access needs API {required}, running {api_level}")]
    UnsupportedPlatform { api_level: u32, required: u32 },
}

/// Readable byte stream produced by the resolver
pub struct ByteSource {
    reader: Box<dyn Read + Send>,
    origin: String,
}

impl ByteSource {
    pub fn new(reader: Box<dyn Read + Send>, origin: impl Into<String>) -> Self {
        Self {
            reader,
            origin: origin.into(),
        }
    }

    /// Plain local read, used for app-private store files
    pub fn from_file(path: &Path) -> Result<Self, AccessError> {
        open_direct(path)
    }

    /// Where the bytes come from, for logging
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource")
            .field("origin", &self.origin)
            .finish()
    }
}

/// Produces readable streams for watched files in either access mode
#[derive(Debug, Clone)]
pub struct AccessResolver {
    restricted_root: PathBuf,
    platform: Platform,
    grants: Arc<GrantStore>,
}

impl AccessResolver {
    pub fn new(config: &EngineConfig, grants: Arc<GrantStore>) -> Self {
        Self {
            restricted_root: config.restricted_root(),
            platform: config.platform,
            grants,
        }
    }

    pub fn open(&self, path: &Path, mode: AccessMode) -> Result<ByteSource, AccessError> {
        match mode {
            AccessMode::Direct => open_direct(path),
            AccessMode::ViaGrantedHandle => self.open_granted(path),
        }
    }

    fn open_granted(&self, path: &Path) -> Result<ByteSource, AccessError> {
        if !self.platform.supports_granted_handle() {
            return Err(AccessError::UnsupportedPlatform {
                api_level: self.platform.api_level,
                required: Platform::SCOPED_STORAGE_API,
            });
        }

        let handle = self
            .grants
            .current()
            .ok_or_else(|| AccessError::PermissionDenied("No granted handle".to_string()))?;

        let segments = self.segments(path)?;
        let leaf = tree::resolve(handle.as_ref(), segments.as_slice())?;
        let reader = handle.open(&leaf)?;

        Ok(ByteSource::new(reader, path.display().to_string()))
    }

    /// Name chain from the granted root down to the file
    fn segments(&self, path: &Path) -> Result<Vec<String>, AccessError> {
        let relative = path.strip_prefix(&self.restricted_root).map_err(|_| {
            AccessError::PermissionDenied(format!(
                "{} is outside the granted area",
                path.display()
            ))
        })?;

        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();

        if segments.is_empty() {
            return Err(AccessError::PermissionDenied(format!(
                "{} names no file",
                path.display()
            )));
        }
        Ok(segments)
    }
}

fn open_direct(path: &Path) -> Result<ByteSource, AccessError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(AccessError::NotFound(path.to_path_buf())),
        Err(e) => return Err(map_io(path, e)),
    }

    let file = File::open(path).map_err(|e| map_io(path, e))?;
    Ok(ByteSource::new(Box::new(file), path.display().to_string()))
}

fn map_io(path: &Path, err: io::Error) -> AccessError {
    match err.kind() {
        io::ErrorKind::NotFound => AccessError::NotFound(path.to_path_buf()),
        _ => AccessError::PermissionDenied(format!("{}: {}", path.display(), err)),
    }
}
