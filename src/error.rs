//! Error taxonomy for the watch & recovery engine
//!
//! Every error except `StorageUnavailable` is contained to the single event
//! that produced it: the observer keeps running and later events are the
//! only retry vector.

use std::path::PathBuf;
use thiserror::Error;

use crate::access::AccessError;
use crate::mirror::MirrorError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// File vanished between the event and the copy
    #[error("Source missing: {0}")]
    SourceMissing(PathBuf),

    /// Grant missing, invalid, or unsupported on this platform
    #[error("Access denied for {path}: {reason}")]
    AccessDenied { path: PathBuf, reason: String },

    /// I/O failure while mirroring
    #[error("Copy failed for {path}: {reason}")]
    CopyFailed { path: PathBuf, reason: String },

    /// Backup or recovery root cannot be created; the engine cannot continue
    #[error("Storage unavailable at {path}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    #[error("Watch error on {path}: {reason}")]
    Watch { path: PathBuf, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Only storage failures stop the engine
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::StorageUnavailable { .. })
    }

    /// Map a resolver outcome for `path` onto the engine taxonomy
    pub fn from_access(path: PathBuf, err: AccessError) -> Self {
        match err {
            AccessError::NotFound(_) => EngineError::SourceMissing(path),
            other => EngineError::AccessDenied {
                path,
                reason: other.to_string(),
            },
        }
    }

    pub fn from_mirror(path: PathBuf, err: MirrorError) -> Self {
        EngineError::CopyFailed {
            path,
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },

    #[error("Could not determine {0} directory")]
    MissingDirectory(&'static str),
}

pub type Result<T> = std::result::Result<T, EngineError>;
