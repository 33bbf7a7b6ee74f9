//! Snapshot catalog: enumerate, paginate, delete and prune archives.
//!
//! Each snapshot is `<stem>.tar.gz` plus an optional `<stem>.json` sidecar
//! holding `{type, created}`. A snapshot without a sidecar counts as manual.

use crate::store::{RetentionConfig, RetentionStore, RetentionUpdate};
use crate::tools::archive::ARCHIVE_EXTENSION;
use crate::utils::errors::{EngineError, Result};
use crate::utils::format_bytes;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NAME_PREFIX: &str = "openclaw_backup";
const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Manual,
    Auto,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Manual => "manual",
            SnapshotKind::Auto => "auto",
        }
    }
}

impl FromStr for SnapshotKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(SnapshotKind::Manual),
            "auto" => Ok(SnapshotKind::Auto),
            other => Err(EngineError::Validation(format!(
                "snapshot type must be 'manual' or 'auto', got '{}'",
                other
            ))),
        }
    }
}

/// Sidecar contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    #[serde(rename = "type")]
    pub kind: SnapshotKind,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub name: String,
    pub size: u64,
    pub size_human: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: SnapshotKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPage {
    pub entries: Vec<SnapshotEntry>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

/// Generate a snapshot file name: timestamp (second granularity), type tag and
/// a random suffix so that two snapshots in the same second cannot collide.
pub fn snapshot_name(kind: SnapshotKind, now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}{}",
        NAME_PREFIX,
        now.format("%Y-%m-%dT%H-%M-%S"),
        kind.as_str(),
        &suffix[..8],
        ARCHIVE_EXTENSION
    )
}

/// Accept only plain `.tar.gz` file names inside the snapshot root.
pub fn validate_name(name: &str) -> Result<()> {
    let stem = name
        .strip_suffix(ARCHIVE_EXTENSION)
        .ok_or_else(|| EngineError::Validation(format!("only {} archives are allowed", ARCHIVE_EXTENSION)))?;
    let valid = !stem.is_empty()
        && !stem.starts_with('.')
        && stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid {
        return Err(EngineError::Validation(format!("invalid snapshot name '{}'", name)));
    }
    Ok(())
}

/// Stem shared by an archive, its sidecar and its staging directory.
pub fn stem(name: &str) -> &str {
    name.strip_suffix(ARCHIVE_EXTENSION).unwrap_or(name)
}

pub struct Catalog {
    root: PathBuf,
    retention: Arc<RetentionStore>,
    leases: Arc<DashMap<String, usize>>,
}

impl Catalog {
    pub fn new(root: PathBuf, retention: Arc<RetentionStore>) -> Self {
        Self {
            root,
            retention,
            leases: Arc::new(DashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn sidecar_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", stem(name)))
    }

    pub fn retention(&self) -> RetentionConfig {
        self.retention.get()
    }

    /// One page of snapshots, newest modification first. Never fails: an
    /// unreadable root lists as empty.
    pub async fn list(&self, page: usize, page_size: usize) -> SnapshotPage {
        let entries = self.scan().await;
        paginate(entries, page, page_size)
    }

    async fn scan(&self) -> Vec<SnapshotEntry> {
        let root = self.root.clone();
        match tokio::task::spawn_blocking(move || scan_root(&root)).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Snapshot scan task failed");
                Vec::new()
            }
        }
    }

    pub async fn write_sidecar(&self, name: &str, meta: &SnapshotMeta) -> Result<()> {
        let body = serde_json::to_vec_pretty(meta)?;
        tokio::fs::write(self.sidecar_path(name), body).await?;
        Ok(())
    }

    /// Remove a snapshot's archive and sidecar.
    pub async fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.remove_unleased(name).await?;
        info!(snapshot = %name, "Snapshot deleted");
        Ok(())
    }

    async fn remove_unleased(&self, name: &str) -> Result<()> {
        let leases = self.leases.clone();
        let root = self.root.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || remove_unleased(&leases, &root, &name)).await?
    }

    /// Delete the oldest automatic snapshots beyond `maxBackups`.
    ///
    /// Manual snapshots are never considered. Leased snapshots are skipped and a
    /// failed delete is logged without stopping the remaining deletions.
    pub async fn prune(&self) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        let max = self.retention.get().max_backups as usize;
        if max == 0 {
            return Ok(report);
        }

        let mut autos: Vec<SnapshotEntry> = self
            .scan()
            .await
            .into_iter()
            .filter(|e| e.kind == SnapshotKind::Auto)
            .collect();
        autos.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| b.name.cmp(&a.name)));

        for entry in autos.into_iter().skip(max) {
            match self.remove_unleased(&entry.name).await {
                Ok(()) => {
                    info!(snapshot = %entry.name, "Pruned snapshot");
                    report.deleted.push(entry.name);
                }
                Err(EngineError::Conflict(_)) => {
                    debug!(snapshot = %entry.name, "Skipping prune of leased snapshot");
                    report.skipped.push(entry.name);
                }
                Err(e) => {
                    warn!(snapshot = %entry.name, error = %e, "Failed to prune snapshot");
                    report.failed.push(entry.name);
                }
            }
        }

        Ok(report)
    }

    /// Persist a retention change, then prune against it.
    pub async fn update_retention(&self, update: RetentionUpdate) -> Result<RetentionConfig> {
        let retention = self.retention.clone();
        let config = tokio::task::spawn_blocking(move || retention.update(update)).await??;
        if let Err(e) = self.prune().await {
            warn!(error = %e, "Prune after retention update failed");
        }
        Ok(config)
    }

    /// Hold a read lease on a snapshot; prune and delete leave it alone until dropped.
    pub fn lease(&self, name: &str) -> Result<SnapshotLease> {
        validate_name(name)?;
        // Same entry lock as `remove_unleased`: the existence check and the
        // increment cannot interleave with a removal.
        let entry = self.leases.entry(name.to_string());
        if !self.archive_path(name).is_file() {
            return Err(EngineError::NotFound(format!("snapshot {} not found", name)));
        }
        *entry.or_insert(0) += 1;
        Ok(SnapshotLease {
            name: name.to_string(),
            leases: self.leases.clone(),
        })
    }
}

/// Guard returned by [`Catalog::lease`].
pub struct SnapshotLease {
    name: String,
    leases: Arc<DashMap<String, usize>>,
}

impl SnapshotLease {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SnapshotLease {
    fn drop(&mut self) {
        let released = match self.leases.get_mut(&self.name) {
            Some(mut count) => {
                let next = count.saturating_sub(1);
                *count = next;
                next == 0
            }
            None => false,
        };
        if released {
            self.leases.remove_if(&self.name, |_, count| *count == 0);
        }
    }
}

/// Remove `name` and its sidecar unless it is leased. The lease table entry
/// stays locked from the lease check until both files are gone.
fn remove_unleased(leases: &DashMap<String, usize>, root: &Path, name: &str) -> Result<()> {
    let entry = leases.entry(name.to_string());
    let archive = root.join(name);
    if !archive.is_file() {
        return Err(EngineError::NotFound(format!("snapshot {} not found", name)));
    }
    if let Entry::Occupied(count) = &entry {
        if *count.get() > 0 {
            return Err(EngineError::Conflict(format!("snapshot {} is in use", name)));
        }
    }

    std::fs::remove_file(&archive)?;
    match std::fs::remove_file(root.join(format!("{}.json", stem(name)))) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    drop(entry);
    Ok(())
}

fn scan_root(root: &Path) -> Vec<SnapshotEntry> {
    let read_dir = match std::fs::read_dir(root) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            debug!(root = %root.display(), error = %e, "Snapshot root unreadable");
            return Vec::new();
        }
    };

    let mut entries: Vec<SnapshotEntry> = read_dir
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(ARCHIVE_EXTENSION) {
                return None;
            }
            let metadata = entry.metadata().ok()?;
            if !metadata.is_file() {
                return None;
            }
            let modified: DateTime<Utc> = metadata.modified().ok()?.into();
            let meta = read_sidecar(&root.join(format!("{}.json", stem(&name))));
            let (kind, created) = match meta {
                Some(meta) => (meta.kind, meta.created),
                None => (SnapshotKind::Manual, modified),
            };
            Some(SnapshotEntry {
                size_human: format_bytes(metadata.len()),
                size: metadata.len(),
                name,
                created,
                modified,
                kind,
            })
        })
        .collect();

    entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    entries
}

fn read_sidecar(path: &Path) -> Option<SnapshotMeta> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

fn paginate(entries: Vec<SnapshotEntry>, page: usize, page_size: usize) -> SnapshotPage {
    let page = page.max(1);
    let page_size = match page_size {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    };
    let total = entries.len();
    let total_pages = total.div_ceil(page_size);
    let entries = entries
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    SnapshotPage {
        entries,
        page,
        page_size,
        total,
        total_pages,
    }
}
