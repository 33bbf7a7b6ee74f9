//! Restore status table with a single-flight guard.
//!
//! Every restore gets its own id and status record. At most one restore may be
//! in flight; a second request is rejected instead of sharing the record. Only
//! the most recent [`MAX_RETAINED`] records are kept.

use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

/// Finished records beyond this many are forgotten, oldest first.
pub const MAX_RETAINED: usize = 32;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStatus {
    pub id: Option<Uuid>,
    pub in_progress: bool,
    pub filename: String,
    pub progress: u8,
    pub message: String,
    pub completed: bool,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RestoreStatus {
    pub fn idle() -> Self {
        Self {
            id: None,
            in_progress: false,
            filename: String::new(),
            progress: 0,
            message: "Idle".to_string(),
            completed: false,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn starting(id: Uuid, filename: &str) -> Self {
        Self {
            id: Some(id),
            in_progress: true,
            filename: filename.to_string(),
            progress: 0,
            message: "Starting restore...".to_string(),
            completed: false,
            error: None,
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !self.in_progress && (self.completed || self.error.is_some())
    }
}

#[derive(Default)]
struct Slots {
    active: Option<Uuid>,
    /// Record ids, oldest first
    history: VecDeque<Uuid>,
}

/// Tracks restore progress keyed by restore id
pub struct RestoreTracker {
    statuses: DashMap<Uuid, RestoreStatus>,
    slots: Mutex<Slots>,
}

impl RestoreTracker {
    pub fn new() -> Self {
        Self {
            statuses: DashMap::new(),
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Claim the single restore slot and record a fresh "starting" status.
    pub fn begin(&self, filename: &str) -> Result<Uuid> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(running) = slots.active {
            return Err(EngineError::Conflict(format!(
                "restore {} is already in progress",
                running
            )));
        }

        let id = Uuid::new_v4();
        self.statuses.insert(id, RestoreStatus::starting(id, filename));
        slots.active = Some(id);
        slots.history.push_back(id);
        self.evict(&mut slots);
        Ok(id)
    }

    fn evict(&self, slots: &mut Slots) {
        while slots.history.len() > MAX_RETAINED {
            let oldest_finished = slots.history.iter().position(|id| {
                self.statuses
                    .get(id)
                    .map(|status| status.is_terminal())
                    .unwrap_or(true)
            });
            match oldest_finished.and_then(|index| slots.history.remove(index)) {
                Some(id) => {
                    self.statuses.remove(&id);
                }
                None => break,
            }
        }
    }

    /// Move to a new stage. Progress never goes backwards.
    pub fn advance(&self, id: Uuid, progress: u8, message: impl Into<String>) {
        if let Some(mut status) = self.statuses.get_mut(&id) {
            status.progress = status.progress.max(progress.min(100));
            status.message = message.into();
        }
    }

    pub fn complete(&self, id: Uuid) {
        if let Some(mut status) = self.statuses.get_mut(&id) {
            status.in_progress = false;
            status.completed = true;
            status.progress = 100;
            status.message = "Restore completed!".to_string();
            status.finished_at = Some(Utc::now());
        }
        self.release(id);
    }

    pub fn fail(&self, id: Uuid, error: &EngineError) {
        if let Some(mut status) = self.statuses.get_mut(&id) {
            status.in_progress = false;
            status.error = Some(error.to_string());
            status.message = format!("Error: {}", error);
            status.finished_at = Some(Utc::now());
        }
        self.release(id);
    }

    fn release(&self, id: Uuid) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.active == Some(id) {
            slots.active = None;
        }
    }

    pub fn get(&self, id: Uuid) -> Option<RestoreStatus> {
        self.statuses.get(&id).map(|s| s.value().clone())
    }

    /// Status of the most recent restore, or an idle record if none has run.
    pub fn current(&self) -> RestoreStatus {
        let latest = self
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .history
            .back()
            .copied();
        latest
            .and_then(|id| self.get(id))
            .unwrap_or_else(RestoreStatus::idle)
    }

    pub fn is_active(&self) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active
            .is_some()
    }
}

impl Default for RestoreTracker {
    fn default() -> Self {
        Self::new()
    }
}
