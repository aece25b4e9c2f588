//! Backup and recovery store layout
//!
//! Both stores are laid out as `<root>/<variant>/<category>/<filename>`.

use std::fs;
use std::path::PathBuf;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{Category, Variant};

/// Resolves (variant, category) pairs to store directories
#[derive(Debug, Clone)]
pub struct StorageLocator {
    backup_root: PathBuf,
    recovery_root: PathBuf,
}

impl StorageLocator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            backup_root: config.backup_root(),
            recovery_root: config.recovery_root(),
        }
    }

    /// Create both store roots. Failure here is fatal to the engine.
    pub fn ensure_roots(&self) -> Result<()> {
        ensure_dir(self.backup_root.clone())?;
        ensure_dir(self.recovery_root.clone())?;
        Ok(())
    }

    /// Backup directory for the pair, created if absent
    pub fn backup_dir(&self, variant: Variant, category: Category) -> Result<PathBuf> {
        ensure_dir(self.backup_path(variant, category))
    }

    /// Recovery directory for the pair, created if absent
    pub fn recovery_dir(&self, variant: Variant, category: Category) -> Result<PathBuf> {
        ensure_dir(self.recovery_path(variant, category))
    }

    /// Backup directory path without touching the filesystem
    pub fn backup_path(&self, variant: Variant, category: Category) -> PathBuf {
        self.backup_root
            .join(variant.as_str())
            .join(category.as_str())
    }

    /// Recovery directory path without touching the filesystem
    pub fn recovery_path(&self, variant: Variant, category: Category) -> PathBuf {
        self.recovery_root
            .join(variant.as_str())
            .join(category.as_str())
    }
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf> {
    if !path.is_dir() {
        fs::create_dir_all(&path).map_err(|e| EngineError::StorageUnavailable {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_dirs_are_created_on_demand() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::new(dir.path(), dir.path().join("ext"));
        let locator = StorageLocator::new(&config);

        let backup = locator.backup_dir(Variant::Secondary, Category::Images).unwrap();
        let recovery = locator.recovery_dir(Variant::Primary, Category::VoiceNotes).unwrap();

        assert_eq!(backup, dir.path().join("file_backup/secondary/images"));
        assert_eq!(recovery, dir.path().join("file_recovery/primary/voice_notes"));
        assert!(backup.is_dir());
        assert!(recovery.is_dir());
    }

    #[test]
    fn test_paths_do_not_create() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::new(dir.path(), dir.path().join("ext"));
        let locator = StorageLocator::new(&config);

        let path = locator.recovery_path(Variant::Primary, Category::Documents);
        assert!(!path.exists());
    }

    #[test]
    fn test_unwritable_root_is_storage_unavailable() {
        let dir = tempdir().unwrap();
        // A regular file where the storage root should be
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "x").unwrap();
        let config = EngineConfig::new(&blocker, dir.path().join("ext"));
        let locator = StorageLocator::new(&config);

        let err = locator.ensure_roots().unwrap_err();
        assert!(err.is_fatal());
    }
}
