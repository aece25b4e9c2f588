use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;

use super::coordinator::{Outcome, RecoveryCoordinator};
use super::observer::{DirectoryObserver, Observation, ObservationSink};
use super::registry::WatchRegistry;
use super::tracker::SubfolderTracker;
use crate::access::{AccessResolver, GrantStore};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{ChangeKind, FileEvent, WatchTarget};
use crate::signal::RecoveryListener;
use crate::storage::StorageLocator;

type SharedTracker = Arc<Mutex<SubfolderTracker>>;

/// Observers and dispatchers of one start/stop cycle
struct Session {
    observers: Vec<DirectoryObserver>,
    trackers: Vec<SharedTracker>,
    dispatchers: Vec<JoinHandle<()>>,
}

impl Session {
    fn new() -> Self {
        Self {
            observers: Vec::new(),
            trackers: Vec::new(),
            dispatchers: Vec::new(),
        }
    }

    /// Disarm every observer and cancel the dispatchers, returning their handles
    fn teardown(&mut self) -> Vec<JoinHandle<()>> {
        for observer in &mut self.observers {
            observer.stop_watching();
        }
        for tracker in &self.trackers {
            lock(tracker).stop();
        }
        for dispatcher in &self.dispatchers {
            dispatcher.abort();
        }
        std::mem::take(&mut self.dispatchers)
    }
}

/// Hosts every observer and routes their events to the coordinator
///
/// Each target gets its own bounded queue drained by one dispatcher task, so
/// events of a target are handled in the order they were observed while
/// targets proceed independently. Copies run on the blocking pool, capped by
/// `workers`.
pub struct RecoveryEngine {
    config: EngineConfig,
    registry: WatchRegistry,
    grants: Arc<GrantStore>,
    coordinator: Arc<RecoveryCoordinator>,
    running: Arc<AtomicBool>,
    halted: Arc<Notify>,
    session: Option<Session>,
}

impl RecoveryEngine {
    pub fn new(config: EngineConfig, listener: Arc<dyn RecoveryListener>) -> Self {
        let grants = Arc::new(GrantStore::load(&config.preferences_path));
        let registry = WatchRegistry::build(&config);
        let coordinator = Arc::new(RecoveryCoordinator::new(
            StorageLocator::new(&config),
            AccessResolver::new(&config, Arc::clone(&grants)),
            listener,
        ));

        Self {
            config,
            registry,
            grants,
            coordinator,
            running: Arc::new(AtomicBool::new(false)),
            halted: Arc::new(Notify::new()),
            session: None,
        }
    }

    /// Replace the registry built from the static folder layout
    pub fn with_registry(mut self, registry: WatchRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub fn grants(&self) -> Arc<GrantStore> {
        Arc::clone(&self.grants)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resolves once a fatal error has stopped event handling
    pub async fn halted(&self) {
        self.halted.notified().await;
    }

    /// Arm an observer for every existing target directory
    ///
    /// Must be called from within a tokio runtime. A no-op while running;
    /// a session halted by a fatal error is discarded and rebuilt.
    pub fn start(&mut self) -> Result<()> {
        if let Some(mut halted) = self.session.take() {
            if self.is_running() {
                self.session = Some(halted);
                return Ok(());
            }
            tracing::info!("Discarding halted session before restart");
            halted.teardown();
        }

        self.coordinator.locator().ensure_roots()?;
        self.halted = Arc::new(Notify::new());

        let primitive = self.config.watch_primitive();
        let window = self.config.watch.debounce_window;
        let workers = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut session = Session::new();

        self.running.store(true, Ordering::SeqCst);

        for target in self.registry.targets() {
            if !target.path.is_dir() {
                tracing::debug!(path = %target.path.display(), "Target directory missing, skipping");
                continue;
            }

            let (tx, rx) = mpsc::channel(self.config.watch.queue_capacity.max(1));
            let sink = ObservationSink::new(tx, target.label());

            let tracker = if target.rolling {
                let mut tracker = SubfolderTracker::new(&target.path, primitive, window, sink.clone());
                if let Err(e) = tracker.recompute() {
                    tracing::warn!(path = %target.path.display(), error = %e, "Failed to watch active subfolder");
                }
                Some(Arc::new(Mutex::new(tracker)))
            } else {
                None
            };

            let mut observer =
                DirectoryObserver::new(&target.path, primitive, window, target.rolling, sink);
            if let Err(e) = observer.start_watching() {
                tracing::warn!(path = %target.path.display(), error = %e, "Failed to watch target");
                if let Some(tracker) = &tracker {
                    lock(tracker).stop();
                }
                continue;
            }

            let dispatcher = Dispatcher {
                target: target.clone(),
                coordinator: Arc::clone(&self.coordinator),
                tracker: tracker.clone(),
                workers: Arc::clone(&workers),
                running: Arc::clone(&self.running),
                halted: Arc::clone(&self.halted),
            };
            session.dispatchers.push(tokio::spawn(dispatcher.run(rx)));
            session.observers.push(observer);
            session.trackers.extend(tracker);
        }

        tracing::info!(
            watched = session.observers.len(),
            registered = self.registry.len(),
            primitive = %primitive,
            "Recovery engine started"
        );
        self.session = Some(session);
        Ok(())
    }

    /// Disarm every observer. In-flight copies finish; no new work starts.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        let Some(mut session) = self.session.take() else {
            return;
        };

        for dispatcher in session.teardown() {
            let _ = dispatcher.await;
        }

        tracing::info!("Recovery engine stopped");
    }
}

impl std::fmt::Debug for RecoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryEngine")
            .field("targets", &self.registry.len())
            .field("running", &self.is_running())
            .finish()
    }
}

fn lock(tracker: &SharedTracker) -> std::sync::MutexGuard<'_, SubfolderTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drains one target's queue in order
struct Dispatcher {
    target: WatchTarget,
    coordinator: Arc<RecoveryCoordinator>,
    tracker: Option<SharedTracker>,
    workers: Arc<Semaphore>,
    running: Arc<AtomicBool>,
    halted: Arc<Notify>,
}

impl Dispatcher {
    async fn run(self, mut rx: mpsc::Receiver<Observation>) {
        while let Some(observation) = rx.recv().await {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            match observation {
                Observation::Directory(_) => self.rescan(),
                Observation::File(event) => {
                    if event.kind == ChangeKind::Deleted && self.is_active_subfolder(&event) {
                        self.rescan();
                        continue;
                    }
                    if !self.handle(event).await {
                        break;
                    }
                }
            }
        }
    }

    fn is_active_subfolder(&self, event: &FileEvent) -> bool {
        self.tracker
            .as_ref()
            .is_some_and(|tracker| lock(tracker).is_active(event.path()))
    }

    fn rescan(&self) {
        let Some(tracker) = &self.tracker else {
            return;
        };
        if let Err(e) = lock(tracker).recompute() {
            tracing::warn!(target_dir = %self.target.label(), error = %e, "Failed to retarget rolling directory");
        }
    }

    /// Returns false once the engine must stop
    async fn handle(&self, event: FileEvent) -> bool {
        let Ok(permit) = Arc::clone(&self.workers).acquire_owned().await else {
            return false;
        };
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }

        let coordinator = Arc::clone(&self.coordinator);
        let target = self.target.clone();
        let path = event.path.clone();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            coordinator.handle(&target, &event)
        });

        match task.await {
            Ok(Ok(Outcome::Recovered(file))) => {
                tracing::debug!(file = %file.file_name, "Recovery complete");
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.is_fatal() => {
                tracing::error!(error = %e, "Storage unavailable, stopping recovery engine");
                self.running.store(false, Ordering::SeqCst);
                self.halted.notify_one();
                return false;
            }
            Ok(Err(EngineError::SourceMissing(missing))) => {
                tracing::debug!(path = %missing.display(), "Source vanished before copy");
            }
            Ok(Err(e)) => {
                tracing::warn!(target_dir = %self.target.label(), path = %path.display(), error = %e, "Event handling failed");
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Copy task failed");
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Platform, WatchSettings};
    use crate::models::RecoveredFile;
    use crate::signal::ChannelListener;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::mpsc::UnboundedReceiver;
    use url::Url;

    struct Fixture {
        dir: TempDir,
        config: EngineConfig,
        engine: RecoveryEngine,
        signals: UnboundedReceiver<RecoveredFile>,
    }

    fn fixture() -> Fixture {
        fixture_with(
            Platform::new(28),
            WatchSettings {
                debounce_window: Duration::from_millis(200),
                ..WatchSettings::default()
            },
        )
    }

    fn fixture_with(platform: Platform, watch: WatchSettings) -> Fixture {
        let dir = tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("data"), dir.path().join("ext"))
            .with_platform(platform)
            .with_watch(watch);
        let (listener, signals) = ChannelListener::new();
        let engine = RecoveryEngine::new(config.clone(), Arc::new(listener));

        Fixture {
            dir,
            config,
            engine,
            signals,
        }
    }

    fn legacy_folder(config: &EngineConfig, suffix: &str) -> PathBuf {
        let folder = config
            .external_root
            .join("WhatsApp/Media")
            .join(format!("WhatsApp {}", suffix));
        fs::create_dir_all(&folder).unwrap();
        folder
    }

    async fn wait_for(check: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    fn content_is(path: &Path, expected: &[u8]) -> bool {
        fs::read(path).map(|b| b == expected).unwrap_or(false)
    }

    fn age(path: &Path, secs_ago: i64) {
        let now = FileTime::now().unix_seconds();
        set_file_mtime(path, FileTime::from_unix_time(now - secs_ago, 0)).unwrap();
    }

    fn trackers(engine: &RecoveryEngine) -> Vec<SharedTracker> {
        engine
            .session
            .as_ref()
            .map(|session| session.trackers.clone())
            .unwrap_or_default()
    }

    fn recomputations(engine: &RecoveryEngine) -> u64 {
        trackers(engine).iter().map(|t| lock(t).recomputations()).sum()
    }

    fn tracks(engine: &RecoveryEngine, path: &Path) -> bool {
        trackers(engine).iter().any(|t| lock(t).is_active(path))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_then_delete_is_recovered() {
        let mut fx = fixture();
        let images = legacy_folder(&fx.config, "Images");
        fx.engine.start().unwrap();
        assert!(fx.engine.is_running());

        let photo = images.join("photo.jpg");
        fs::write(&photo, b"jpeg-bytes").unwrap();
        let backup = fx.config.backup_root().join("primary/images/photo.jpg");
        assert!(wait_for(|| content_is(&backup, b"jpeg-bytes")).await);

        fs::remove_file(&photo).unwrap();
        let signal = tokio::time::timeout(Duration::from_secs(5), fx.signals.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(signal.file_name, "photo.jpg");
        assert_eq!(fs::read(&signal.recovered_path).unwrap(), b"jpeg-bytes");
        assert!(!backup.exists());

        fx.engine.stop().await;
        assert!(!fx.engine.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_restart_does_not_duplicate_recoveries() {
        let mut fx = fixture();
        let docs = legacy_folder(&fx.config, "Documents");
        fx.engine.start().unwrap();

        let doc = docs.join("report.pdf");
        fs::write(&doc, b"pdf").unwrap();
        let backup = fx.config.backup_root().join("primary/documents/report.pdf");
        assert!(wait_for(|| backup.is_file()).await);
        fs::remove_file(&doc).unwrap();
        tokio::time::timeout(Duration::from_secs(5), fx.signals.recv())
            .await
            .unwrap()
            .unwrap();

        fx.engine.stop().await;
        fx.engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        fx.engine.stop().await;

        assert!(fx.signals.try_recv().is_err());
        let recovered: Vec<_> = fs::read_dir(fx.config.recovery_root().join("primary/documents"))
            .unwrap()
            .collect();
        assert_eq!(recovered.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_copies_after_stop() {
        let mut fx = fixture();
        let videos = legacy_folder(&fx.config, "Video");
        fx.engine.start().unwrap();
        fx.engine.stop().await;

        fs::write(videos.join("clip.mp4"), b"mp4").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!fx
            .config
            .backup_root()
            .join("primary/videos/clip.mp4")
            .exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rolling_target_mirrors_newest_subfolder() {
        let mut fx = fixture();
        let notes = legacy_folder(&fx.config, "Voice Notes");
        let old = notes.join("202401");
        let current = notes.join("202402");
        fs::create_dir_all(&old).unwrap();
        fs::create_dir_all(&current).unwrap();
        age(&old, 7200);
        age(&current, 60);
        fx.engine.start().unwrap();

        fs::write(current.join("PTT-0001.opus"), b"voice").unwrap();
        let backup = fx.config.backup_root().join("primary/voice_notes/PTT-0001.opus");
        assert!(wait_for(|| content_is(&backup, b"voice")).await);

        let next = notes.join("202403");
        fs::create_dir_all(&next).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        fs::write(next.join("PTT-0002.opus"), b"newer").unwrap();
        let next_backup = fx.config.backup_root().join("primary/voice_notes/PTT-0002.opus");
        assert!(wait_for(|| content_is(&next_backup, b"newer")).await);

        fx.engine.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rolling_target_on_extended_is_idle_when_quiet() {
        let mut fx = fixture_with(
            Platform::new(33),
            WatchSettings {
                debounce_window: Duration::from_millis(100),
                ..WatchSettings::default()
            },
        );
        let notes = fx
            .config
            .restricted_root()
            .join("com.whatsapp/WhatsApp/Media/WhatsApp Voice Notes");
        let old = notes.join("202401");
        let current = notes.join("202402");
        fs::create_dir_all(&old).unwrap();
        fs::create_dir_all(&current).unwrap();
        age(&old, 7200);
        age(&current, 60);
        let uri = Url::from_directory_path(fx.config.restricted_root()).unwrap();
        fx.engine.grants().grant(uri.as_str()).unwrap();
        fx.engine.start().unwrap();
        assert!(tracks(&fx.engine, &current));

        fs::write(current.join("PTT-0001.opus"), b"voice").unwrap();
        let backup = fx.config.backup_root().join("primary/voice_notes/PTT-0001.opus");
        assert!(wait_for(|| content_is(&backup, b"voice")).await);

        tokio::time::sleep(Duration::from_millis(500)).await;
        let settled = recomputations(&fx.engine);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(recomputations(&fx.engine), settled);

        let next = notes.join("202403");
        fs::create_dir_all(&next).unwrap();
        assert!(wait_for(|| tracks(&fx.engine, &next)).await);
        fs::write(next.join("PTT-0002.opus"), b"newer").unwrap();
        let next_backup = fx.config.backup_root().join("primary/voice_notes/PTT-0002.opus");
        assert!(wait_for(|| content_is(&next_backup, b"newer")).await);

        fx.engine.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_deleting_active_subfolder_retargets() {
        let mut fx = fixture();
        let notes = legacy_folder(&fx.config, "Voice Notes");
        let old = notes.join("202401");
        let current = notes.join("202402");
        fs::create_dir_all(&old).unwrap();
        fs::create_dir_all(&current).unwrap();
        age(&old, 7200);
        age(&current, 60);
        fx.engine.start().unwrap();
        assert!(tracks(&fx.engine, &current));

        fs::remove_dir_all(&current).unwrap();
        assert!(wait_for(|| tracks(&fx.engine, &old)).await);

        fs::write(old.join("PTT-0003.opus"), b"older folder").unwrap();
        let backup = fx.config.backup_root().join("primary/voice_notes/PTT-0003.opus");
        assert!(wait_for(|| content_is(&backup, b"older folder")).await);

        fx.engine.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_polling_mirrors_final_content_before_delete() {
        let mut fx = fixture_with(
            Platform::new(28),
            WatchSettings {
                debounce_window: Duration::from_millis(50),
                poll_interval: Some(Duration::from_millis(100)),
                ..WatchSettings::default()
            },
        );
        let images = legacy_folder(&fx.config, "Images");
        fx.engine.start().unwrap();

        let photo = images.join("photo.jpg");
        for content in ["v1", "v2-longer", "v3-final-content"] {
            fs::write(&photo, content).unwrap();
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        let backup = fx.config.backup_root().join("primary/images/photo.jpg");
        assert!(wait_for(|| content_is(&backup, b"v3-final-content")).await);

        fs::remove_file(&photo).unwrap();
        let signal = tokio::time::timeout(Duration::from_secs(5), fx.signals.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fs::read(&signal.recovered_path).unwrap(), b"v3-final-content");

        fx.engine.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_restart_after_fatal_halt() {
        let mut fx = fixture();
        let images = legacy_folder(&fx.config, "Images");
        fx.engine.start().unwrap();

        let backup_root = fx.config.backup_root();
        fs::remove_dir_all(&backup_root).unwrap();
        fs::write(&backup_root, b"not a directory").unwrap();
        fs::write(images.join("first.jpg"), b"one").unwrap();

        tokio::time::timeout(Duration::from_secs(5), fx.engine.halted())
            .await
            .unwrap();
        assert!(!fx.engine.is_running());

        fs::remove_file(&backup_root).unwrap();
        fx.engine.start().unwrap();
        assert!(fx.engine.is_running());

        fs::write(images.join("second.jpg"), b"two").unwrap();
        let backup = backup_root.join("primary/images/second.jpg");
        assert!(wait_for(|| content_is(&backup, b"two")).await);

        fx.engine.stop().await;
    }

    #[tokio::test]
    async fn test_unwritable_storage_fails_start() {
        let fx = fixture();
        let blocker = fx.dir.path().join("blocked");
        fs::write(&blocker, b"x").unwrap();
        let config = EngineConfig::new(&blocker, fx.dir.path().join("ext"));
        let (listener, _rx) = ChannelListener::new();
        let mut engine = RecoveryEngine::new(config, Arc::new(listener));

        let err = engine.start().unwrap_err();
        assert!(err.is_fatal());
        assert!(!engine.is_running());
    }
}
