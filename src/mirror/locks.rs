use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::{Category, Variant};

/// Identity used to correlate a backup with its recovery
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CopyKey {
    pub variant: Variant,
    pub category: Category,
    pub file_name: String,
}

impl CopyKey {
    pub fn new(variant: Variant, category: Category, file_name: impl Into<String>) -> Self {
        Self {
            variant,
            category,
            file_name: file_name.into(),
        }
    }
}

/// Per-key mutual exclusion for backup and recovery work
///
/// Slots are created on first use and dropped once no caller holds them.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<CopyKey, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`
    pub fn with_lock<T>(&self, key: &CopyKey, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots();
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let result = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut slots = self.slots();
        // Only the map and this caller still reference the slot
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }

        result
    }

    /// Number of keys currently held or awaited
    pub fn active(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<CopyKey, Arc<Mutex<()>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
