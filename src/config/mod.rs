//! Engine configuration
//!
//! A single `EngineConfig` is built at startup and shared by reference with
//! every component. It carries the app-private storage root, the shared
//! storage root the external app writes into, and the platform capability
//! check used to choose access modes and watch primitives once per target.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::{AccessMode, WatchPrimitive};

const BACKUP_DIR: &str = "file_backup";
const RECOVERY_DIR: &str = "file_recovery";
const PREFERENCES_FILE: &str = "permission_preferences.json";

/// Platform capability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub api_level: u32,
}

impl Platform {
    /// First API level with scoped storage; the restricted media area is only
    /// reachable through a granted handle from here on
    pub const SCOPED_STORAGE_API: u32 = 29;

    /// Last API level on which the legacy top-level app folders are used
    pub const LEGACY_LAYOUT_MAX_API: u32 = 29;

    pub fn new(api_level: u32) -> Self {
        Self { api_level }
    }

    pub fn supports_granted_handle(&self) -> bool {
        self.api_level >= Self::SCOPED_STORAGE_API
    }

    pub fn uses_legacy_layout(&self) -> bool {
        self.api_level <= Self::LEGACY_LAYOUT_MAX_API
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new(Self::SCOPED_STORAGE_API + 4)
    }
}

/// Observer tuning
#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Quiet period before a batch of events is classified and delivered
    pub debounce_window: Duration,
    /// Use the polling watcher at this cadence instead of native notifications
    pub poll_interval: Option<Duration>,
    /// Per-target event queue size; events beyond it are dropped with a warning
    pub queue_capacity: usize,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(500),
            poll_interval: None,
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// App-private base directory; backup and recovery stores live below it
    pub storage_root: PathBuf,
    /// Shared storage root holding the external app's media folders
    pub external_root: PathBuf,
    pub platform: Platform,
    pub watch: WatchSettings,
    /// Maximum number of concurrent copy tasks
    pub workers: usize,
    /// Key/value file holding the persisted grant
    pub preferences_path: PathBuf,
}

impl EngineConfig {
    pub fn new(storage_root: impl Into<PathBuf>, external_root: impl Into<PathBuf>) -> Self {
        let storage_root = storage_root.into();
        let preferences_path = storage_root.join(PREFERENCES_FILE);
        Self {
            storage_root,
            external_root: external_root.into(),
            platform: Platform::default(),
            watch: WatchSettings::default(),
            workers: default_workers(),
            preferences_path,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_watch(mut self, watch: WatchSettings) -> Self {
        self.watch = watch;
        self
    }

    /// Load from the environment (and a `.env` file if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let storage_root = match env::var("MEDIA_RECOVERY_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::data_local_dir()
                .ok_or(ConfigError::MissingDirectory("data"))?
                .join("media-recovery"),
        };

        let external_root = match env::var("MEDIA_RECOVERY_EXTERNAL_ROOT") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::home_dir().ok_or(ConfigError::MissingDirectory("home"))?,
        };

        let mut config = Self::new(storage_root, external_root);

        if let Some(level) = parse_env::<u32>("MEDIA_RECOVERY_API_LEVEL")? {
            config.platform = Platform::new(level);
        }
        if let Some(ms) = parse_env::<u64>("MEDIA_RECOVERY_DEBOUNCE_MS")? {
            config.watch.debounce_window = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64>("MEDIA_RECOVERY_POLL_MS")? {
            config.watch.poll_interval = Some(Duration::from_millis(ms.max(1)));
        }
        if let Some(capacity) = parse_env::<usize>("MEDIA_RECOVERY_QUEUE_CAPACITY")? {
            config.watch.queue_capacity = capacity.max(1);
        }
        if let Some(workers) = parse_env::<usize>("MEDIA_RECOVERY_WORKERS")? {
            config.workers = workers.max(1);
        }

        Ok(config)
    }

    pub fn backup_root(&self) -> PathBuf {
        self.storage_root.join(BACKUP_DIR)
    }

    pub fn recovery_root(&self) -> PathBuf {
        self.storage_root.join(RECOVERY_DIR)
    }

    /// Root of the OS-restricted media area
    pub fn restricted_root(&self) -> PathBuf {
        self.external_root.join("Android").join("media")
    }

    /// Is `path` inside the OS-restricted media area
    pub fn is_restricted(&self, path: &Path) -> bool {
        path.starts_with(self.restricted_root())
    }

    /// Can `path` be opened without a grant on the running platform
    pub fn is_directly_openable(&self, path: &Path) -> bool {
        !self.platform.supports_granted_handle() || !self.is_restricted(path)
    }

    /// Access mode for a watch target, decided once when the target is built
    pub fn access_mode_for(&self, path: &Path) -> AccessMode {
        if self.is_restricted(path) && !self.is_directly_openable(path) {
            AccessMode::ViaGrantedHandle
        } else {
            AccessMode::Direct
        }
    }

    /// Watch primitive for every observer in this process
    pub fn watch_primitive(&self) -> WatchPrimitive {
        match self.watch.poll_interval {
            Some(interval) => WatchPrimitive::Polling(interval),
            None if self.platform.supports_granted_handle() => WatchPrimitive::Extended,
            None => WatchPrimitive::Legacy,
        }
    }
}

fn default_workers() -> usize {
    num_cpus::get().max(2)
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
