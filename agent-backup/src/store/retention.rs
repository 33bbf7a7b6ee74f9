//! Retention settings persisted at `backups/config.json`.

use crate::fs::write_atomic;
use crate::utils::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionConfig {
    /// Number of automatic snapshots to keep, 0 keeps all of them
    pub max_backups: u32,

    /// Reserved. Persisted for clients but not enforced.
    pub max_backups_size: u64,
}

/// Partial update of [`RetentionConfig`]; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionUpdate {
    pub max_backups: Option<u32>,
    pub max_backups_size: Option<u64>,
}

pub struct RetentionStore {
    path: PathBuf,
    current: RwLock<RetentionConfig>,
}

impl RetentionStore {
    /// Load the store from `path`. A missing or malformed file yields defaults.
    pub fn open(path: PathBuf) -> Self {
        let current = Self::read(&path);
        Self {
            path,
            current: RwLock::new(current),
        }
    }

    fn read(path: &Path) -> RetentionConfig {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Malformed retention config, using defaults");
                RetentionConfig::default()
            }),
            Err(_) => RetentionConfig::default(),
        }
    }

    pub fn get(&self) -> RetentionConfig {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Apply `update`, persist the result, and return it.
    pub fn update(&self, update: RetentionUpdate) -> Result<RetentionConfig> {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = current.clone();
        if let Some(max) = update.max_backups {
            next.max_backups = max;
        }
        if let Some(size) = update.max_backups_size {
            next.max_backups_size = size;
        }

        write_atomic(&self.path, serde_json::to_string_pretty(&next)?.as_bytes())?;
        info!(max_backups = next.max_backups, "Retention config updated");
        *current = next.clone();
        Ok(next)
    }
}
