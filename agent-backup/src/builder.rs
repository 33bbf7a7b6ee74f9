//! Snapshot composition: stage the manifest, pack it, record its metadata.

use crate::catalog::{self, Catalog, SnapshotKind, SnapshotMeta};
use crate::manifest::MANIFEST;
use crate::tools::Archiver;
use crate::utils::errors::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SnapshotBuilder {
    data_root: PathBuf,
    catalog: Arc<Catalog>,
    archiver: Arc<dyn Archiver>,
}

impl SnapshotBuilder {
    pub fn new(data_root: PathBuf, catalog: Arc<Catalog>, archiver: Arc<dyn Archiver>) -> Self {
        Self {
            data_root,
            catalog,
            archiver,
        }
    }

    /// Build a snapshot of every present manifest entry and return its archive name.
    ///
    /// Packing starts only after all copies succeed, so a returned name always
    /// refers to a complete archive. On failure no archive or sidecar is left
    /// behind.
    pub async fn create(&self, kind: SnapshotKind) -> Result<String> {
        let created = Utc::now();
        let name = catalog::snapshot_name(kind, created);
        let staging = self.catalog.root().join(catalog::stem(&name));
        let archive = self.catalog.archive_path(&name);
        let sidecar = self.catalog.sidecar_path(&name);

        info!(snapshot = %name, kind = kind.as_str(), "Creating snapshot");
        tokio::fs::create_dir_all(&staging).await?;

        if let Err(e) = self.stage_and_pack(&staging, &archive).await {
            warn!(snapshot = %name, error = %e, "Snapshot creation failed");
            discard(&staging, &archive, &sidecar).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            warn!(staging = %staging.display(), error = %e, "Failed to remove staging directory");
        }

        // Without its sidecar an auto snapshot would list as manual and escape retention.
        if let Err(e) = self.catalog.write_sidecar(&name, &SnapshotMeta { kind, created }).await {
            warn!(snapshot = %name, error = %e, "Failed to record snapshot metadata");
            discard(&staging, &archive, &sidecar).await;
            return Err(e);
        }

        info!(snapshot = %name, "Snapshot created");

        if kind == SnapshotKind::Auto {
            match self.catalog.prune().await {
                Ok(report) if !report.deleted.is_empty() => {
                    info!(pruned = report.deleted.len(), "Retention applied");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Retention pruning failed"),
            }
        }

        Ok(name)
    }

    async fn stage_and_pack(&self, staging: &Path, archive: &Path) -> Result<()> {
        let data_root = self.data_root.clone();
        let staging_root = staging.to_path_buf();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            for entry in MANIFEST {
                let stats = entry.stage(&data_root, &staging_root)?;
                debug!(entry = entry.label, files = stats.files, bytes = stats.bytes, "Staged");
            }
            Ok(())
        })
        .await??;

        self.archiver.pack(staging, archive).await
    }
}

async fn discard(staging: &Path, archive: &Path, sidecar: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(staging).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(staging = %staging.display(), error = %e, "Failed to remove staging directory");
        }
    }
    for path in [archive, sidecar] {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Could not discard partial snapshot file");
            }
        }
    }
}
