//! Restore engine: extract a snapshot and replay the manifest onto the live tree.
//!
//! Stages run strictly in order and the first failure stops the restore. The
//! status record then shows how far it got, and the extraction directory is
//! kept for inspection.

pub mod status;

pub use status::{RestoreStatus, RestoreTracker};

use crate::catalog::{self, Catalog, SnapshotLease};
use crate::manifest::MANIFEST;
use crate::schedule::ScheduleReconciler;
use crate::tools::{Archiver, ServiceManager};
use crate::utils::errors::{EngineError, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const EXTRACT_PROGRESS: u8 = 10;
const RECONCILE_PROGRESS: u8 = 98;

pub struct Restorer {
    data_root: PathBuf,
    catalog: Arc<Catalog>,
    archiver: Arc<dyn Archiver>,
    services: Arc<dyn ServiceManager>,
    schedules: Arc<ScheduleReconciler>,
    tracker: Arc<RestoreTracker>,
}

/// Handle to an accepted restore. Dropping it does not cancel the restore.
pub struct RestoreHandle {
    pub id: Uuid,
    task: JoinHandle<()>,
    tracker: Arc<RestoreTracker>,
}

impl RestoreHandle {
    pub fn status(&self) -> RestoreStatus {
        self.tracker.get(self.id).unwrap_or_else(RestoreStatus::idle)
    }

    /// Wait for the restore to reach a terminal state.
    pub async fn wait(self) -> RestoreStatus {
        if let Err(e) = self.task.await {
            warn!(restore_id = %self.id, error = %e, "Restore supervisor task failed");
        }
        self.tracker.get(self.id).unwrap_or_else(RestoreStatus::idle)
    }
}

impl Restorer {
    pub fn new(
        data_root: PathBuf,
        catalog: Arc<Catalog>,
        archiver: Arc<dyn Archiver>,
        services: Arc<dyn ServiceManager>,
        schedules: Arc<ScheduleReconciler>,
    ) -> Self {
        Self {
            data_root,
            catalog,
            archiver,
            services,
            schedules,
            tracker: Arc::new(RestoreTracker::new()),
        }
    }

    /// Accept a restore of `filename` and run it in the background.
    ///
    /// Returns once the status shows `inProgress`. A missing archive fails
    /// immediately with `NotFound` (and is recorded in the status); a restore
    /// already in flight fails with `Conflict`.
    pub fn start(self: &Arc<Self>, filename: &str) -> Result<RestoreHandle> {
        catalog::validate_name(filename)?;
        let id = self.tracker.begin(filename)?;

        let lease = match self.catalog.lease(filename) {
            Ok(lease) => lease,
            Err(e) => {
                warn!(snapshot = %filename, error = %e, "Restore rejected");
                self.tracker.fail(id, &e);
                return Err(e);
            }
        };

        info!(restore_id = %id, snapshot = %filename, "Restore accepted");

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let worker = tokio::spawn({
                let this = Arc::clone(&this);
                async move { this.run(id, lease).await }
            });
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(e) => Err(EngineError::from(e)),
            };
            match outcome {
                Ok(()) => {
                    info!(restore_id = %id, "Restore completed");
                    this.tracker.complete(id);
                }
                Err(e) => {
                    error!(restore_id = %id, error = %e, "Restore failed");
                    this.tracker.fail(id, &e);
                }
            }
        });

        Ok(RestoreHandle {
            id,
            task,
            tracker: self.tracker.clone(),
        })
    }

    /// Status of the most recent restore
    pub fn status(&self) -> RestoreStatus {
        self.tracker.current()
    }

    pub fn status_of(&self, id: Uuid) -> Option<RestoreStatus> {
        self.tracker.get(id)
    }

    pub fn is_running(&self) -> bool {
        self.tracker.is_active()
    }

    async fn run(&self, id: Uuid, lease: SnapshotLease) -> Result<()> {
        let archive = self.catalog.archive_path(lease.name());
        let suffix = Uuid::new_v4().simple().to_string();
        let temp = self.catalog.root().join(format!(
            "temp_restore_{}_{}",
            Utc::now().timestamp_millis(),
            &suffix[..8]
        ));

        self.tracker.advance(id, EXTRACT_PROGRESS, "Extracting backup...");
        tokio::fs::create_dir_all(&temp).await?;
        let extracted = self.archiver.unpack(&archive, &temp).await?;
        drop(lease);

        for entry in MANIFEST {
            self.tracker
                .advance(id, entry.progress, format!("Restoring {}...", entry.label));
            if !entry.present_in(&extracted) {
                debug!(entry = entry.label, "Not in snapshot, skipping");
                continue;
            }

            let source = extracted.clone();
            let data_root = self.data_root.clone();
            let stats =
                tokio::task::spawn_blocking(move || entry.restore_into(&source, &data_root)).await??;
            debug!(entry = entry.label, files = stats.files, bytes = stats.bytes, "Restored");
        }

        self.tracker
            .advance(id, RECONCILE_PROGRESS, "Reconciling system...");
        self.services.fix_ownership(&self.data_root).await?;
        self.services.install_gateway().await?;
        self.services.restart_gateway().await?;
        self.schedules.resync_from_store().await?;

        tokio::fs::remove_dir_all(&temp).await?;
        Ok(())
    }
}
