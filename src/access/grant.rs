use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::prefs::{Preferences, GRANT_KEY};
use super::tree::{GrantedTree, MountedTree};
use super::AccessError;

/// Minimum spacing between on-demand re-reads while no handle is cached
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Holds the process-wide granted handle
///
/// The persisted grant is read once at startup and again on demand while no
/// usable handle is cached, at most once per retry interval. An absent or
/// invalid grant is not an error here; lookups through it simply report
/// `PermissionDenied`.
#[derive(Debug)]
pub struct GrantStore {
    preferences_path: Option<PathBuf>,
    cached: RwLock<Option<Arc<dyn GrantedTree>>>,
    retry_interval: Duration,
    reads: Mutex<ReadState>,
}

#[derive(Debug, Default)]
struct ReadState {
    last_attempt: Option<Instant>,
    /// Last unusable URI already reported, so it is warned about once
    rejected: Option<String>,
}

enum Persisted {
    Absent,
    Usable(Arc<dyn GrantedTree>),
    Unusable { uri: String, error: AccessError },
}

impl GrantStore {
    /// Read the persisted grant from the preferences file
    pub fn load(preferences_path: &Path) -> Self {
        let store = Self {
            preferences_path: Some(preferences_path.to_path_buf()),
            cached: RwLock::new(None),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            reads: Mutex::new(ReadState::default()),
        };
        if store.refresh().is_none() {
            tracing::debug!(path = %preferences_path.display(), "No usable granted handle persisted");
        }
        store
    }

    /// Store with a fixed handle and no persistence
    pub fn with_tree(tree: Arc<dyn GrantedTree>) -> Self {
        Self {
            preferences_path: None,
            cached: RwLock::new(Some(tree)),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            reads: Mutex::new(ReadState::default()),
        }
    }

    /// Store that never yields a handle
    pub fn empty() -> Self {
        Self {
            preferences_path: None,
            cached: RwLock::new(None),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            reads: Mutex::new(ReadState::default()),
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Current handle, re-reading the persisted grant if none is cached and
    /// the last read is older than the retry interval
    pub fn current(&self) -> Option<Arc<dyn GrantedTree>> {
        if let Some(tree) = self
            .cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Some(tree);
        }

        let due = self
            .reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_attempt
            .map_or(true, |at| at.elapsed() >= self.retry_interval);
        if !due {
            return None;
        }
        self.refresh()
    }

    /// Re-read the persisted grant, replacing the cached handle
    pub fn refresh(&self) -> Option<Arc<dyn GrantedTree>> {
        let path = self.preferences_path.as_ref()?;
        let persisted = read_persisted(path);

        let tree = {
            let mut reads = self.reads.lock().unwrap_or_else(PoisonError::into_inner);
            reads.last_attempt = Some(Instant::now());

            match persisted {
                Persisted::Absent => {
                    reads.rejected = None;
                    None
                }
                Persisted::Usable(tree) => {
                    reads.rejected = None;
                    Some(tree)
                }
                Persisted::Unusable { uri, error } => {
                    if reads.rejected.as_deref() == Some(uri.as_str()) {
                        tracing::debug!(uri = %uri, "Persisted grant still unusable");
                    } else {
                        tracing::warn!(uri = %uri, error = %error, "Persisted grant is unusable");
                        reads.rejected = Some(uri);
                    }
                    None
                }
            }
        };

        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = tree.clone();
        tree
    }

    /// Validate and persist a newly granted URI
    pub fn grant(&self, uri: &str) -> Result<(), AccessError> {
        let tree = MountedTree::from_uri(uri)?;

        if let Some(path) = &self.preferences_path {
            let mut prefs = Preferences::load(path);
            prefs.set(GRANT_KEY, tree.to_uri().unwrap_or_else(|| uri.to_string()));
            prefs
                .save()
                .map_err(|e| AccessError::PermissionDenied(format!("Failed to persist grant: {}", e)))?;
        }

        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(tree));
        tracing::info!(uri = %uri, "Granted handle stored");
        Ok(())
    }

    /// Forget the persisted grant
    pub fn revoke(&self) -> io::Result<()> {
        if let Some(path) = &self.preferences_path {
            let mut prefs = Preferences::load(path);
            if prefs.remove(GRANT_KEY).is_some() {
                prefs.save()?;
            }
        }
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

fn read_persisted(path: &Path) -> Persisted {
    let prefs = Preferences::load(path);
    let Some(uri) = prefs.get(GRANT_KEY) else {
        return Persisted::Absent;
    };

    match MountedTree::from_uri(uri) {
        Ok(tree) => Persisted::Usable(Arc::new(tree)),
        Err(error) => Persisted::Unusable {
            uri: uri.to_string(),
            error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use url::Url;

    #[test]
    fn test_grant_is_persisted_and_reloaded() {
        let dir = tempdir().unwrap();
        let granted = dir.path().join("media");
        fs::create_dir_all(&granted).unwrap();
        let prefs_path = dir.path().join("prefs.json");

        let store = GrantStore::load(&prefs_path);
        assert!(store.current().is_none());

        let uri = Url::from_directory_path(&granted).unwrap().to_string();
        store.grant(&uri).unwrap();

        let reloaded = GrantStore::load(&prefs_path);
        assert!(reloaded.current().is_some());
    }

    #[test]
    fn test_grant_written_later_is_picked_up_on_demand() {
        let dir = tempdir().unwrap();
        let granted = dir.path().join("media");
        fs::create_dir_all(&granted).unwrap();
        let prefs_path = dir.path().join("prefs.json");

        let store = GrantStore::load(&prefs_path).with_retry_interval(Duration::ZERO);
        assert!(store.current().is_none());

        // Another process completes the consent flow
        let mut prefs = Preferences::load(&prefs_path);
        prefs.set(GRANT_KEY, Url::from_directory_path(&granted).unwrap().to_string());
        prefs.save().unwrap();

        assert!(store.current().is_some());
    }

    #[test]
    fn test_missing_grant_is_not_reread_on_every_lookup() {
        let dir = tempdir().unwrap();
        let granted = dir.path().join("media");
        fs::create_dir_all(&granted).unwrap();
        let prefs_path = dir.path().join("prefs.json");

        let store = GrantStore::load(&prefs_path).with_retry_interval(Duration::from_secs(3600));
        assert!(store.current().is_none());

        let mut prefs = Preferences::load(&prefs_path);
        prefs.set(GRANT_KEY, Url::from_directory_path(&granted).unwrap().to_string());
        prefs.save().unwrap();

        assert!(store.current().is_none());
        assert!(store.refresh().is_some());
        assert!(store.current().is_some());
    }

    #[test]
    fn test_unusable_grant_is_remembered() {
        let dir = tempdir().unwrap();
        let prefs_path = dir.path().join("prefs.json");
        let mut prefs = Preferences::load(&prefs_path);
        prefs.set(GRANT_KEY, "file:///gone/away");
        prefs.save().unwrap();

        let store = GrantStore::load(&prefs_path).with_retry_interval(Duration::ZERO);
        assert!(store.current().is_none());
        assert!(store.current().is_none());

        let reads = store.reads.lock().unwrap();
        assert_eq!(reads.rejected.as_deref(), Some("file:///gone/away"));
    }

    #[test]
    fn test_invalid_persisted_grant_degrades_to_none() {
        let dir = tempdir().unwrap();
        let prefs_path = dir.path().join("prefs.json");
        let mut prefs = Preferences::load(&prefs_path);
        prefs.set(GRANT_KEY, "file:///gone/away");
        prefs.save().unwrap();

        let store = GrantStore::load(&prefs_path);
        assert!(store.current().is_none());
    }

    #[test]
    fn test_revoke_clears_handle() {
        let dir = tempdir().unwrap();
        let granted = dir.path().join("media");
        fs::create_dir_all(&granted).unwrap();
        let prefs_path = dir.path().join("prefs.json");

        let store = GrantStore::load(&prefs_path);
        store
            .grant(&Url::from_directory_path(&granted).unwrap().to_string())
            .unwrap();
        store.revoke().unwrap();

        assert!(store.current().is_none());
        assert!(GrantStore::load(&prefs_path).current().is_none());
    }
}
