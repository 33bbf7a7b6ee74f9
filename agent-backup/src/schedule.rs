//! Schedule reconciler: canonical schedule list plus its scheduler mirror.
//!
//! The record store is authoritative. The scheduler text is rebuilt from the
//! enabled subset on every change, touching only lines that mention the
//! backup script.

use crate::config::{Config, Layout};
use crate::store::{Schedule, ScheduleStore};
use crate::tools::SchedulerMirror;
use crate::utils::errors::{EngineError, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct ScheduleReconciler {
    store: ScheduleStore,
    mirror: Arc<dyn SchedulerMirror>,
    /// Searched in order for the backup script
    script_candidates: Vec<PathBuf>,
    /// Substring identifying lines owned by this engine
    marker: String,
    log_file: PathBuf,
    /// Serializes store mutations and mirror rewrites
    lock: Mutex<()>,
}

impl ScheduleReconciler {
    pub fn new(config: &Config, layout: &Layout, mirror: Arc<dyn SchedulerMirror>) -> Self {
        let script_name = &config.schedule.script_name;
        let script_candidates = config
            .schedule
            .script_dirs
            .iter()
            .map(|dir| {
                if dir.is_absolute() {
                    dir.join(script_name)
                } else {
                    layout.data_root.join(dir).join(script_name)
                }
            })
            .collect();

        Self {
            store: ScheduleStore::new(layout.schedule_file()),
            mirror,
            script_candidates,
            marker: script_name.clone(),
            log_file: layout.log_file.clone(),
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    pub fn list(&self) -> Vec<Schedule> {
        self.store.load()
    }

    /// Append a schedule, persist, then mirror. A mirror failure is logged only.
    pub async fn create(&self, cron: &str, enabled: bool) -> Result<Schedule> {
        let cron = self.validate_cron(cron)?;
        let schedule = Schedule {
            id: format!("backup_{}", Uuid::new_v4().simple()),
            cron,
            enabled,
            created: Utc::now(),
        };

        let _guard = self.lock.lock().await;
        let mut schedules = self.store.load();
        schedules.push(schedule.clone());
        self.store.save(&schedules)?;
        info!(id = %schedule.id, cron = %schedule.cron, enabled, "Schedule created");

        if let Err(e) = self.mirror_locked(&schedules).await {
            warn!(error = %e, "Scheduler mirror out of date after create");
        }
        Ok(schedule)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut schedules = self.store.load();
        let before = schedules.len();
        schedules.retain(|s| s.id != id);
        if schedules.len() == before {
            return Err(EngineError::NotFound(format!("schedule {}", id)));
        }

        self.store.save(&schedules)?;
        info!(%id, "Schedule deleted");

        if let Err(e) = self.mirror_locked(&schedules).await {
            warn!(error = %e, "Scheduler mirror out of date after delete");
        }
        Ok(())
    }

    /// Rewrite the scheduler text so its owned lines match `schedules`.
    pub async fn resync(&self, schedules: &[Schedule]) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.mirror_locked(schedules).await
    }

    /// Resync from whatever the record store holds right now.
    pub async fn resync_from_store(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        let schedules = self.store.load();
        self.mirror_locked(&schedules).await
    }

    /// Caller holds `self.lock`.
    async fn mirror_locked(&self, schedules: &[Schedule]) -> Result<()> {
        let current = self.mirror.read().await?;
        let script = self.resolve_script();
        let next = render(&current, schedules, &self.marker, &script, &self.log_file);
        if next == current {
            debug!("Scheduler mirror already up to date");
            return Ok(());
        }

        self.mirror.write(&next).await?;
        info!(
            active = schedules.iter().filter(|s| s.enabled).count(),
            script = %script.display(),
            "Scheduler mirror updated"
        );
        Ok(())
    }

    /// First candidate that exists, otherwise the first candidate.
    pub fn resolve_script(&self) -> PathBuf {
        self.script_candidates
            .iter()
            .find(|p| p.exists())
            .or_else(|| self.script_candidates.first())
            .cloned()
            .unwrap_or_else(|| PathBuf::from(&self.marker))
    }

    fn validate_cron(&self, cron: &str) -> Result<String> {
        let cron = cron.trim();
        if cron.is_empty() {
            return Err(EngineError::Validation("cron expression is empty".into()));
        }
        if cron.contains('\n') || cron.contains('\r') {
            return Err(EngineError::Validation(
                "cron expression must be a single line".into(),
            ));
        }
        if cron.contains(&self.marker) {
            return Err(EngineError::Validation(format!(
                "cron expression must not mention {}",
                self.marker
            )));
        }
        Ok(cron.to_string())
    }
}

/// Build the next scheduler text: foreign lines kept in order, owned lines
/// regenerated from the enabled schedules.
pub fn render(
    current: &str,
    schedules: &[Schedule],
    marker: &str,
    script: &Path,
    log_file: &Path,
) -> String {
    let mut lines: Vec<String> = current
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.contains(marker))
        .map(str::to_string)
        .collect();

    lines.extend(schedules.iter().filter(|s| s.enabled).map(|s| {
        format!(
            "{} {} --auto >> {} 2>&1",
            s.cron,
            script.display(),
            log_file.display()
        )
    }));

    if lines.is_empty() {
        return String::new();
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}
