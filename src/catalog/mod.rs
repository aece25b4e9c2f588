//! Recovery store listing
//!
//! Produced by scanning the recovery store on request, independent of the
//! engine's event path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::models::{Category, RecoveredItem, Variant};
use crate::storage::StorageLocator;

/// Recovered files of one (variant, category), most recent first
///
/// Only regular files with an extension listed for the category are
/// included. A store directory that does not exist yet lists as empty.
pub fn list_recovered(
    locator: &StorageLocator,
    variant: Variant,
    category: Category,
) -> io::Result<Vec<RecoveredItem>> {
    let dir = locator.recovery_path(variant, category);
    let mut files = match scan(&dir, category) {
        Ok(files) => files,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut items = Vec::with_capacity(files.len());
    for (_, path) in files {
        match RecoveredItem::from_path(&path, items.len(), category) {
            Ok(item) => items.push(item),
            // Removed between scan and stat
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(items)
}

fn scan(dir: &Path, category: Category) -> io::Result<Vec<(SystemTime, PathBuf)>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !has_listed_extension(&path, category) {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta,
            _ => continue,
        };
        files.push((meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), path));
    }

    Ok(files)
}

fn has_listed_extension(path: &Path, category: Category) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| category.extensions().contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::tempdir;

    #[test]
    fn test_lists_most_recent_first() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::new(dir.path(), dir.path().join("ext"));
        let locator = StorageLocator::new(&config);
        let store = locator.recovery_dir(Variant::Primary, Category::Images).unwrap();

        let old = store.join("old.jpg");
        let new = store.join("new.PNG");
        fs::write(&old, b"old").unwrap();
        fs::write(&new, vec![0u8; 2048]).unwrap();
        fs::write(store.join("notes.txt"), b"skip").unwrap();
        fs::create_dir(store.join("folder.jpg")).unwrap();
        set_file_mtime(&old, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
        set_file_mtime(&new, FileTime::from_unix_time(1_710_000_000, 0)).unwrap();

        let items = list_recovered(&locator, Variant::Primary, Category::Images).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "new");
        assert_eq!(items[0].id, 0);
        assert_eq!(items[0].human_size, "2.0 KB");
        assert_eq!(items[0].last_modified_ms, 1_710_000_000_000);
        assert_eq!(items[0].mime_type.as_deref(), Some("image/png"));
        assert_eq!(items[1].title, "old");
        assert_eq!(items[1].id, 1);
        assert!(items.iter().all(|i| i.human_duration.is_none()));
    }

    #[test]
    fn test_missing_store_lists_empty() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::new(dir.path(), dir.path().join("ext"));
        let locator = StorageLocator::new(&config);

        let items = list_recovered(&locator, Variant::Secondary, Category::Documents).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_variants_are_separate() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::new(dir.path(), dir.path().join("ext"));
        let locator = StorageLocator::new(&config);
        let store = locator.recovery_dir(Variant::Secondary, Category::VoiceNotes).unwrap();
        fs::write(store.join("PTT-1.opus"), b"v").unwrap();

        assert_eq!(
            list_recovered(&locator, Variant::Secondary, Category::VoiceNotes).unwrap().len(),
            1
        );
        assert!(list_recovered(&locator, Variant::Primary, Category::VoiceNotes)
            .unwrap()
            .is_empty());
    }
}
