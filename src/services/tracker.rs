//! Rolling directory tracking
//!
//! Some targets keep their live content in whichever immediate subdirectory
//! was modified most recently (one segment per date). The tracker owns at
//! most one child observer and swaps it, stop-old-then-start-new, whenever
//! a different subdirectory becomes the newest.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::observer::{DirectoryObserver, ObservationSink};
use crate::error::Result;
use crate::models::WatchPrimitive;

#[derive(Debug)]
pub struct SubfolderTracker {
    parent: PathBuf,
    primitive: WatchPrimitive,
    debounce_window: Duration,
    sink: ObservationSink,
    active: Option<DirectoryObserver>,
    recomputations: u64,
}

impl SubfolderTracker {
    pub fn new(
        parent: impl Into<PathBuf>,
        primitive: WatchPrimitive,
        debounce_window: Duration,
        sink: ObservationSink,
    ) -> Self {
        Self {
            parent: parent.into(),
            primitive,
            debounce_window,
            sink,
            active: None,
            recomputations: 0,
        }
    }

    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|o| o.path())
    }

    pub fn is_active(&self, path: &Path) -> bool {
        self.active_path() == Some(path)
    }

    /// How many times the newest subfolder was re-selected
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    /// Re-select the newest subdirectory. Returns true when the child changed.
    pub fn recompute(&mut self) -> Result<bool> {
        self.recomputations += 1;
        let newest = newest_subfolder(&self.parent);
        if newest.as_deref() == self.active_path() {
            return Ok(false);
        }

        if let Some(mut previous) = self.active.take() {
            previous.stop_watching();
        }

        let Some(path) = newest else {
            tracing::debug!(parent = %self.parent.display(), "No subfolder left to track");
            return Ok(true);
        };

        let mut child = DirectoryObserver::new(
            path,
            self.primitive,
            self.debounce_window,
            false,
            self.sink.clone(),
        );
        child.start_watching()?;
        tracing::info!(
            parent = %self.parent.display(),
            active = %child.path().display(),
            "Tracking newest subfolder"
        );
        self.active = Some(child);
        Ok(true)
    }

    pub fn stop(&mut self) {
        if let Some(mut child) = self.active.take() {
            child.stop_watching();
        }
    }
}

/// Immediate subdirectory with the latest modification time
///
/// Hidden directories are skipped; ties go to the greater name.
pub fn newest_subfolder(parent: &Path) -> Option<PathBuf> {
    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(parent = %parent.display(), error = %e, "Cannot list rolling directory");
            return None;
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_dir() {
                return None;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((modified, entry.file_name(), entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, _, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::observer::Observation;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    fn age(path: &Path, secs_ago: i64) {
        let now = FileTime::now();
        set_file_mtime(path, FileTime::from_unix_time(now.unix_seconds() - secs_ago, 0)).unwrap();
    }

    fn tracker(parent: &Path) -> (SubfolderTracker, mpsc::Receiver<Observation>) {
        let (tx, rx) = mpsc::channel(64);
        let tracker = SubfolderTracker::new(
            parent,
            WatchPrimitive::Extended,
            Duration::from_millis(100),
            ObservationSink::new(tx, "voice"),
        );
        (tracker, rx)
    }

    #[test]
    fn test_newest_subfolder_by_mtime() {
        let dir = tempdir().unwrap();
        let older = dir.path().join("2024-01");
        let newer = dir.path().join("2024-02");
        fs::create_dir(&older).unwrap();
        fs::create_dir(&newer).unwrap();
        fs::write(dir.path().join("loose.opus"), b"x").unwrap();
        age(&older, 3600);
        age(&newer, 10);

        assert_eq!(newest_subfolder(dir.path()), Some(newer));
    }

    #[test]
    fn test_hidden_and_missing_are_skipped() {
        let dir = tempdir().unwrap();
        let hidden = dir.path().join(".trash");
        fs::create_dir(&hidden).unwrap();

        assert_eq!(newest_subfolder(dir.path()), None);
        assert_eq!(newest_subfolder(&dir.path().join("absent")), None);
    }

    #[test]
    fn test_tracks_newest_and_retargets() {
        let dir = tempdir().unwrap();
        let jan = dir.path().join("2024-01");
        let feb = dir.path().join("2024-02");
        fs::create_dir(&jan).unwrap();
        fs::create_dir(&feb).unwrap();
        age(&jan, 7200);
        age(&feb, 3600);
        let (mut tracker, _rx) = tracker(dir.path());

        assert!(tracker.recompute().unwrap());
        assert!(tracker.is_active(&feb));
        assert!(!tracker.recompute().unwrap());
        assert_eq!(tracker.recomputations(), 2);

        let mar = dir.path().join("2024-03");
        fs::create_dir(&mar).unwrap();
        assert!(tracker.recompute().unwrap());
        assert_eq!(tracker.active_path(), Some(mar.as_path()));
        assert!(!tracker.is_active(&feb));

        fs::remove_dir(&mar).unwrap();
        assert!(tracker.recompute().unwrap());
        assert!(tracker.is_active(&feb));

        tracker.stop();
        assert_eq!(tracker.active_path(), None);
    }

    #[tokio::test]
    async fn test_only_active_child_delivers() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("2024-01");
        let new = dir.path().join("2024-02");
        fs::create_dir(&old).unwrap();
        fs::create_dir(&new).unwrap();
        age(&old, 7200);
        age(&new, 60);
        let (mut tracker, mut rx) = tracker(dir.path());
        tracker.recompute().unwrap();

        fs::write(old.join("stale.opus"), b"old").unwrap();
        fs::write(new.join("live.opus"), b"new").unwrap();

        let live = new.join("live.opus");
        let mut seen = Vec::new();
        let _ = tokio::time::timeout(Duration::from_secs(3), async {
            while let Some(observation) = rx.recv().await {
                if let Observation::File(event) = observation {
                    let done = event.path == live;
                    seen.push(event.path);
                    if done {
                        break;
                    }
                }
            }
        })
        .await;

        assert!(seen.contains(&live));
        assert!(seen.iter().all(|p| p.starts_with(&new)));
        tracker.stop();
    }
}
