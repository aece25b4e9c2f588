use notify::event::{AccessKind, AccessMode as NotifyAccessMode, MetadataKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer_opt, DebounceEventResult, Debouncer, RecommendedCache};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::{EngineError, Result};
use crate::models::{ChangeKind, FileEvent, WatchPrimitive};

/// Shortest debounce the observer will run with
const MIN_DEBOUNCE: Duration = Duration::from_millis(10);

/// What an observer hands to its target's dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// File-level arrived/departed event, bound for the recovery coordinator
    File(FileEvent),
    /// An immediate subdirectory appeared or changed; rolling targets re-select their active subfolder
    Directory(PathBuf),
}

/// Sending half of a target's event queue
///
/// Delivery never blocks the notification thread: a full queue drops the
/// event with a warning and a later event becomes the retry vector.
#[derive(Debug, Clone)]
pub struct ObservationSink {
    tx: mpsc::Sender<Observation>,
    label: String,
}

impl ObservationSink {
    pub fn new(tx: mpsc::Sender<Observation>, label: impl Into<String>) -> Self {
        Self {
            tx,
            label: label.into(),
        }
    }

    fn deliver(&self, observation: Observation) {
        match self.tx.try_send(observation) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(target_dir = %self.label, event = ?dropped, "Event queue full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(target_dir = %self.label, "Event queue closed");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Arrived,
    Departed,
    Directory,
}

/// Collapses repeated observations of one path inside a debounced batch
///
/// The debouncer only releases an event once the window has passed, so the
/// batch already reflects the settled file. An observation is dropped when
/// the previous one kept for the same path has the same class.
#[derive(Debug, Default)]
pub struct Coalescer {
    last: HashMap<PathBuf, Class>,
    kept: Vec<Observation>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observation: Observation) {
        let (path, class) = match &observation {
            Observation::File(event) if event.kind.is_arrival() => (event.path.clone(), Class::Arrived),
            Observation::File(event) => (event.path.clone(), Class::Departed),
            Observation::Directory(path) => (path.clone(), Class::Directory),
        };
        if self.last.get(&path) == Some(&class) {
            return;
        }
        self.last.insert(path, class);
        self.kept.push(observation);
    }

    pub fn finish(self) -> Vec<Observation> {
        self.kept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Change(ChangeKind),
    /// A writer closed the file; its content is final
    WriteClosed,
    /// Modification time changed; content changes on backends without data events
    Retimed,
    /// Open, read or attribute change; only meaningful on subdirectories
    Touched,
}

/// Map one raw notify event to (path, signal) pairs
fn signals(event: &Event) -> Vec<(PathBuf, Signal)> {
    let all = |signal: Signal| -> Vec<(PathBuf, Signal)> {
        event.paths.iter().map(|p| (p.clone(), signal)).collect()
    };

    match &event.kind {
        EventKind::Create(_) => all(Signal::Change(ChangeKind::Created)),
        EventKind::Remove(_) => all(Signal::Change(ChangeKind::Deleted)),
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime | MetadataKind::Any)) => {
            all(Signal::Retimed)
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => all(Signal::Touched),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(Signal::Change(ChangeKind::Renamed)),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .get(1)
            .map(|to| vec![(to.clone(), Signal::Change(ChangeKind::Renamed))])
            .unwrap_or_default(),
        // Backends that cannot tell the direction of a rename
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .filter(|p| p.exists())
            .map(|p| (p.clone(), Signal::Change(ChangeKind::Renamed)))
            .collect(),
        EventKind::Modify(_) => all(Signal::Change(ChangeKind::Modified)),
        EventKind::Access(AccessKind::Close(NotifyAccessMode::Write)) => all(Signal::WriteClosed),
        EventKind::Access(_) => all(Signal::Touched),
        EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Turns debounced notify batches for one watched directory into observations
///
/// Events about the watched directory itself are dropped: listing it (as the
/// subfolder tracker does) would otherwise report an access on it.
#[derive(Debug, Clone)]
pub struct Classifier {
    root: PathBuf,
    primitive: WatchPrimitive,
    forward_directories: bool,
}

impl Classifier {
    pub fn new(root: impl Into<PathBuf>, primitive: WatchPrimitive, forward_directories: bool) -> Self {
        Self {
            root: root.into(),
            primitive,
            forward_directories,
        }
    }

    pub fn observe<'a>(&self, events: impl IntoIterator<Item = &'a Event>) -> Vec<Observation> {
        let mut coalescer = Coalescer::new();

        for event in events {
            for (path, signal) in signals(event) {
                if path == self.root {
                    continue;
                }
                if let Some(observation) = self.classify(path, signal) {
                    coalescer.push(observation);
                }
            }
        }

        coalescer.finish()
    }

    fn classify(&self, path: PathBuf, signal: Signal) -> Option<Observation> {
        match signal {
            Signal::Change(ChangeKind::Deleted) => {
                Some(Observation::File(FileEvent::new(path, ChangeKind::Deleted)))
            }
            Signal::Change(_) if path.is_dir() => self.directory(path),
            Signal::Change(kind) => Some(Observation::File(FileEvent::new(path, kind))),
            Signal::WriteClosed | Signal::Retimed if path.is_file() => {
                Some(Observation::File(FileEvent::new(path, ChangeKind::Modified)))
            }
            Signal::WriteClosed => None,
            Signal::Retimed | Signal::Touched => {
                if self.primitive.consumes_directory_access() && path.is_dir() {
                    self.directory(path)
                } else {
                    None
                }
            }
        }
    }

    /// Rescan trigger for an immediate subdirectory, when this observer forwards them
    fn directory(&self, path: PathBuf) -> Option<Observation> {
        (self.forward_directories && path.parent() == Some(self.root.as_path()))
            .then_some(Observation::Directory(path))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    Unarmed,
    Watching,
    Stopped,
}

/// Debounced OS watch, native or polling
enum Backend {
    Native(Debouncer<RecommendedWatcher, RecommendedCache>),
    Polling(Debouncer<PollWatcher, RecommendedCache>),
}

impl Backend {
    fn watch(&mut self, path: &Path) -> notify::Result<()> {
        match self {
            Backend::Native(debouncer) => debouncer.watch(path, RecursiveMode::NonRecursive),
            Backend::Polling(debouncer) => debouncer.watch(path, RecursiveMode::NonRecursive),
        }
    }

    fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        match self {
            Backend::Native(debouncer) => debouncer.unwatch(path),
            Backend::Polling(debouncer) => debouncer.unwatch(path),
        }
    }
}

/// Watches one directory (non-recursively) and classifies its events
pub struct DirectoryObserver {
    path: PathBuf,
    primitive: WatchPrimitive,
    debounce_window: Duration,
    forward_directories: bool,
    sink: ObservationSink,
    state: ObserverState,
    backend: Option<Backend>,
    armed: Arc<AtomicBool>,
}

impl DirectoryObserver {
    pub fn new(
        path: impl Into<PathBuf>,
        primitive: WatchPrimitive,
        debounce_window: Duration,
        forward_directories: bool,
        sink: ObservationSink,
    ) -> Self {
        Self {
            path: path.into(),
            primitive,
            debounce_window,
            forward_directories,
            sink,
            state: ObserverState::Unarmed,
            backend: None,
            armed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> ObserverState {
        self.state
    }

    /// Arm the OS-level watch. A no-op while already watching.
    pub fn start_watching(&mut self) -> Result<()> {
        match self.state {
            ObserverState::Watching => return Ok(()),
            ObserverState::Stopped => {
                return Err(EngineError::Watch {
                    path: self.path.clone(),
                    reason: "observer was stopped".to_string(),
                })
            }
            ObserverState::Unarmed => {}
        }

        let watch_error = |e: notify::Error| EngineError::Watch {
            path: self.path.clone(),
            reason: e.to_string(),
        };

        let armed = Arc::clone(&self.armed);
        let sink = self.sink.clone();
        let classifier = Classifier::new(&self.path, self.primitive, self.forward_directories);
        let handler = move |result: DebounceEventResult| {
            if !armed.load(Ordering::SeqCst) {
                return;
            }
            match result {
                Ok(events) => {
                    for observation in classifier.observe(events.iter().map(|e| &e.event)) {
                        tracing::trace!(?observation, "Classified event");
                        sink.deliver(observation);
                    }
                }
                Err(errors) => {
                    for e in errors {
                        tracing::warn!(error = %e, "Watcher error");
                    }
                }
            }
        };

        let timeout = self.debounce_window.max(MIN_DEBOUNCE);
        let mut backend = match self.primitive {
            WatchPrimitive::Legacy | WatchPrimitive::Extended => Backend::Native(
                new_debouncer_opt(timeout, None, handler, RecommendedCache::new(), NotifyConfig::default())
                    .map_err(watch_error)?,
            ),
            WatchPrimitive::Polling(interval) => Backend::Polling(
                new_debouncer_opt(
                    timeout,
                    None,
                    handler,
                    RecommendedCache::new(),
                    NotifyConfig::default().with_poll_interval(interval),
                )
                .map_err(watch_error)?,
            ),
        };

        self.armed.store(true, Ordering::SeqCst);
        if let Err(e) = backend.watch(&self.path) {
            self.armed.store(false, Ordering::SeqCst);
            return Err(watch_error(e));
        }

        tracing::debug!(path = %self.path.display(), primitive = %self.primitive, "Observer armed");
        self.backend = Some(backend);
        self.state = ObserverState::Watching;
        Ok(())
    }

    /// Disarm the watch. Idempotent; no event is delivered afterwards.
    pub fn stop_watching(&mut self) {
        self.armed.store(false, Ordering::SeqCst);
        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = backend.unwatch(&self.path) {
                tracing::debug!(path = %self.path.display(), error = %e, "Failed to unwatch");
            }
            tracing::debug!(path = %self.path.display(), "Observer disarmed");
        }
        self.state = ObserverState::Stopped;
    }
}

impl Drop for DirectoryObserver {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

impl std::fmt::Debug for DirectoryObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryObserver")
            .field("path", &self.path)
            .field("primitive", &self.primitive)
            .field("state", &self.state)
            .finish()
    }
}
