//! Domain types shared across the engine
//!
//! - `target` - watch targets and the enums that classify them
//! - `event` - classified file-level change events
//! - `file` - recovered-file signal payload and listing entries

pub mod event;
pub mod file;
pub mod target;

pub use event::*;
pub use file::*;
pub use target::*;
