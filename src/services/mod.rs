//! Watch & recovery services
//!
//! ## Modules
//! - `registry` - the fixed set of watched directories
//! - `observer` - per-directory OS watch, event classification and debounce
//! - `tracker` - follows the newest subfolder of rolling directories
//! - `coordinator` - backup on arrival, recovery on departure
//! - `engine` - lifecycle, per-target dispatch and the worker pool

pub mod coordinator;
pub mod engine;
pub mod observer;
pub mod registry;
pub mod tracker;

pub use coordinator::{Outcome, RecoveryCoordinator};
pub use engine::RecoveryEngine;
pub use observer::{Classifier, Coalescer, DirectoryObserver, Observation, ObservationSink, ObserverState};
pub use registry::WatchRegistry;
pub use tracker::{newest_subfolder, SubfolderTracker};
