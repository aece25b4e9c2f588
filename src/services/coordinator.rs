use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::access::{AccessResolver, ByteSource};
use crate::error::{EngineError, Result};
use crate::mirror::{self, CopyKey, KeyedLocks};
use crate::models::{ChangeKind, FileEvent, RecoveredFile, WatchTarget};
use crate::signal::RecoveryListener;
use crate::storage::StorageLocator;

/// Result of handling one file-level event
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Arrived file was copied into the backup store
    Mirrored(PathBuf),
    /// Departed file was restored into the recovery store
    Recovered(RecoveredFile),
    /// Departed file had no backup; nothing to do
    NotShadowed,
    /// Event carries no usable file name
    Ignored,
}

/// Turns arrived/departed events into backup and recovery copies
pub struct RecoveryCoordinator {
    locator: StorageLocator,
    resolver: AccessResolver,
    listener: Arc<dyn RecoveryListener>,
    locks: KeyedLocks,
}

impl RecoveryCoordinator {
    pub fn new(
        locator: StorageLocator,
        resolver: AccessResolver,
        listener: Arc<dyn RecoveryListener>,
    ) -> Self {
        Self {
            locator,
            resolver,
            listener,
            locks: KeyedLocks::new(),
        }
    }

    pub fn locator(&self) -> &StorageLocator {
        &self.locator
    }

    /// Blocking; run on the worker pool
    pub fn handle(&self, target: &WatchTarget, event: &FileEvent) -> Result<Outcome> {
        let Some(name) = event.file_name() else {
            return Ok(Outcome::Ignored);
        };

        match event.kind {
            ChangeKind::Deleted => self.on_departed(target, &name),
            ChangeKind::Created | ChangeKind::Modified | ChangeKind::Renamed => {
                self.on_arrived(target, event.path(), &name)
            }
        }
    }

    /// Mirror the file into the backup store, replacing any older copy
    pub fn on_arrived(&self, target: &WatchTarget, path: &Path, name: &str) -> Result<Outcome> {
        let key = CopyKey::new(target.variant, target.category, name);

        self.locks.with_lock(&key, || {
            let mut source = self
                .resolver
                .open(path, target.access_mode)
                .map_err(|e| EngineError::from_access(path.to_path_buf(), e))?;
            let backup_dir = self.locator.backup_dir(target.variant, target.category)?;
            let dest = mirror::copy(&mut source, &backup_dir, name)
                .map_err(|e| EngineError::from_mirror(path.to_path_buf(), e))?;

            tracing::debug!(
                origin = %source.origin(),
                backup = %dest.display(),
                "Mirrored into backup store"
            );
            Ok(Outcome::Mirrored(dest))
        })
    }

    /// Restore a shadowed file into the recovery store
    ///
    /// The backup copy is only removed once the recovery copy is in place.
    pub fn on_departed(&self, target: &WatchTarget, name: &str) -> Result<Outcome> {
        let key = CopyKey::new(target.variant, target.category, name);

        self.locks.with_lock(&key, || {
            let backup = self
                .locator
                .backup_path(target.variant, target.category)
                .join(name);
            if !backup.is_file() {
                tracing::debug!(file = %name, target_dir = %target.label(), "Deleted file was never mirrored");
                return Ok(Outcome::NotShadowed);
            }

            let recovery_dir = self.locator.recovery_dir(target.variant, target.category)?;
            let recovered_path = {
                let mut source = ByteSource::from_file(&backup)
                    .map_err(|e| EngineError::from_access(backup.clone(), e))?;
                mirror::copy(&mut source, &recovery_dir, name)
                    .map_err(|e| EngineError::from_mirror(backup.clone(), e))?
            };

            if let Err(e) = fs::remove_file(&backup) {
                tracing::warn!(path = %backup.display(), error = %e, "Failed to remove backup after recovery");
            }

            let file = RecoveredFile::new(target.variant, target.category, name, recovered_path);
            tracing::info!(
                file = %file.file_name,
                variant = %file.variant,
                category = %file.category,
                "Recovered deleted file"
            );
            self.listener.recovered(&file);
            Ok(Outcome::Recovered(file))
        })
    }
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("locator", &self.locator)
            .field("resolver", &self.resolver)
            .finish()
    }
}
