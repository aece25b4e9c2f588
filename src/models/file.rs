use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{Category, Variant};
use crate::utils::{format_date, format_size};

/// One recovered file as listed for the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredItem {
    /// Position in the most-recent-first listing
    pub id: usize,
    /// File name without extension
    pub title: String,
    /// Absolute path inside the recovery store
    pub absolute_path: String,
    pub category: Category,
    pub size_bytes: u64,
    /// Last modified timestamp (milliseconds since epoch)
    pub last_modified_ms: i64,
    /// e.g. "1.5 MB"
    pub human_size: String,
    /// e.g. "Jan 05, 2024"
    pub human_date: String,
    /// Playback length for audio/video, when it could be determined
    pub human_duration: Option<String>,
    /// MIME type guess based on extension
    pub mime_type: Option<String>,
}

impl RecoveredItem {
    /// Build a listing entry from a file in the recovery store
    pub fn from_path(path: &Path, id: usize, category: Category) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;

        let title = path
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mime_type = path.extension().and_then(|ext| {
            mime_guess::from_ext(&ext.to_string_lossy())
                .first()
                .map(|m| m.to_string())
        });

        let last_modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let absolute_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        Ok(Self {
            id,
            title,
            absolute_path: absolute_path.to_string_lossy().to_string(),
            category,
            size_bytes: metadata.len(),
            last_modified_ms,
            human_size: format_size(metadata.len()),
            human_date: format_date(last_modified_ms),
            human_duration: None,
            mime_type,
        })
    }
}

/// Payload of the "recovered" signal, emitted once per successful recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredFile {
    pub id: Uuid,
    pub variant: Variant,
    pub category: Category,
    pub file_name: String,
    pub recovered_path: PathBuf,
    pub recovered_at: DateTime<Utc>,
}

impl RecoveredFile {
    pub fn new(
        variant: Variant,
        category: Category,
        file_name: impl Into<String>,
        recovered_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            variant,
            category,
            file_name: file_name.into(),
            recovered_path: recovered_path.into(),
            recovered_at: Utc::now(),
        }
    }
}
