//! Storage access abstraction
//!
//! Some watched folders cannot be read through ordinary path-based I/O on
//! newer platforms. Those are reached by walking a persisted, granted
//! hierarchical handle by name segments down to the leaf file.
//!
//! ## Modules
//! - `resolver` - `AccessResolver::open(path, mode)` and `ByteSource`
//! - `tree` - the `GrantedTree` capability and its mounted-directory backend
//! - `grant` - process-wide holder of the persisted grant
//! - `prefs` - JSON key/value preferences where the grant is persisted

pub mod grant;
pub mod prefs;
pub mod resolver;
pub mod tree;

pub use grant::GrantStore;
pub use prefs::{Preferences, GRANT_KEY};
pub use resolver::{AccessError, AccessResolver, ByteSource};
pub use tree::{EntryKind, GrantedTree, MountedTree, TreeEntry};
