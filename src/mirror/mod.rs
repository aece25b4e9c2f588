//! Mirror (copy) operation
//!
//! Streams bytes from a resolved source into the backup or recovery store.
//! The latest observed state always wins: an existing destination with the
//! same name is replaced, never merged or versioned.
//!
//! ## Modules
//! - `io` - atomic copy and write helpers (temp file, fsync, rename)
//! - `locks` - per-(variant, category, filename) mutual exclusion

pub mod io;
pub mod locks;

pub use io::{atomic_write, copy, sync_directory, MirrorError, MirrorErrorKind};
pub use locks::{CopyKey, KeyedLocks};
