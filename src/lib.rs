//! Deletion recovery for a messaging app's media folders
//!
//! Every file that appears in a watched folder is mirrored into a private
//! backup store. When the original is deleted, the backup is moved into a
//! recovery store and a `recovered` signal is raised.

pub mod access;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod models;
pub mod services;
pub mod signal;
pub mod storage;
pub mod utils;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use services::RecoveryEngine;
