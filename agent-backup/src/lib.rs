//! Agent Backup Library
//!
//! Snapshot, restore and schedule engine for an agent's on-disk state.

pub mod api;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod daemon;
pub mod fs;
pub mod manifest;
pub mod restore;
pub mod schedule;
pub mod state;
pub mod store;
pub mod tools;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Config;
pub use state::AppState;
pub use utils::errors::{EngineError, Result};
