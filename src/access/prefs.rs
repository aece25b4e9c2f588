//! Process-wide key/value preferences
//!
//! Stored as a flat JSON object next to the app-private stores. The granted
//! access handle lives here under [`GRANT_KEY`].

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::mirror::atomic_write;

/// Key holding the persisted granted-handle URI
pub const GRANT_KEY: &str = "document_tree_uri";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(flatten)]
    values: BTreeMap<String, String>,

    #[serde(skip)]
    path: PathBuf,
}

impl Preferences {
    /// Load preferences from file, or return empty ones if missing or unreadable
    pub fn load(path: &Path) -> Self {
        let mut prefs = if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => serde_json::from_str::<Preferences>(&content).unwrap_or_else(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt preferences file");
                    Preferences::default()
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read preferences");
                    Preferences::default()
                }
            }
        } else {
            Preferences::default()
        };

        prefs.path = path.to_path_buf();
        prefs
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Save preferences atomically while holding an exclusive file lock
    pub fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_path = self.path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        lock_file.lock_exclusive()?;

        let content = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        let result = atomic_write(&self.path, content.as_bytes()).map_err(io::Error::other);

        let _ = FileExt::unlock(&lock_file);
        result
    }
}
