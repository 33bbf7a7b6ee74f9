//! Canonical schedule list persisted at `cron/backup.json`.
//!
//! The file is re-read on every access: a restore may replace it underneath us.

use crate::fs::write_atomic;
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    /// Cron-style time expression, passed through verbatim
    pub cron: String,
    pub enabled: bool,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ScheduleFile {
    #[serde(default)]
    schedules: Vec<Schedule>,
}

pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// All schedules in stored order. Missing or malformed files read as empty.
    pub fn load(&self) -> Vec<Schedule> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str::<ScheduleFile>(&text) {
            Ok(file) => file.schedules,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed schedule store, treating as empty");
                Vec::new()
            }
        }
    }

    pub fn save(&self, schedules: &[Schedule]) -> Result<()> {
        let file = ScheduleFile {
            schedules: schedules.to_vec(),
        };
        write_atomic(&self.path, serde_json::to_string_pretty(&file)?.as_bytes())?;
        Ok(())
    }
}
