//! The fixed set of named locations that make up a snapshot.
//!
//! Snapshot staging and restore replay both iterate [`MANIFEST`] in order, so
//! every backed-up entry is restorable. Restore skips entries absent from an
//! archive, which keeps archives written before an entry was added restorable.

use crate::fs::{copy_file, copy_tree, CopyStats};
use std::io;
use std::path::Path;

/// Shape of a manifest entry on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// How the staged copy is written back onto the live location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    /// Copy over whatever already exists
    Merge,
    /// Remove the live tree first, then copy
    Replace,
}

#[derive(Debug, Clone, Copy)]
pub struct ManifestEntry {
    /// Stage label shown in restore progress
    pub label: &'static str,
    /// Path relative to the live data root
    pub live: &'static str,
    /// Path relative to the staged snapshot root
    pub staged: &'static str,
    pub kind: EntryKind,
    pub restore: RestoreMode,
    /// Drop VCS metadata, dependency caches and the data root itself when staging
    pub scrub: bool,
    /// Restore progress reported when this stage starts
    pub progress: u8,
}

const fn dir(label: &'static str, path: &'static str, progress: u8) -> ManifestEntry {
    ManifestEntry {
        label,
        live: path,
        staged: path,
        kind: EntryKind::Dir,
        restore: RestoreMode::Merge,
        scrub: false,
        progress,
    }
}

/// Progress for entries after the messaging and cron stages.
const LATE_STAGE: u8 = 96;

pub const MANIFEST: &[ManifestEntry] = &[
    ManifestEntry {
        label: "config",
        live: "openclaw.json",
        staged: "openclaw.json",
        kind: EntryKind::File,
        restore: RestoreMode::Merge,
        scrub: false,
        progress: 20,
    },
    ManifestEntry {
        label: "workspace",
        live: "workspace",
        staged: "workspace",
        kind: EntryKind::Dir,
        restore: RestoreMode::Replace,
        scrub: true,
        progress: 40,
    },
    dir("credentials", "credentials", 55),
    dir("agents", "agents", 70),
    dir("telegram", "telegram", 85),
    dir("cron", "cron", 95),
    dir("devices", "devices", LATE_STAGE),
    dir("identity", "identity", LATE_STAGE),
    dir("memory", "memory", LATE_STAGE),
    dir("canvas", "canvas", LATE_STAGE),
    dir("completions", "completions", LATE_STAGE),
    dir("media", "media", LATE_STAGE),
    dir("skills", "skills", LATE_STAGE),
    ManifestEntry {
        label: "workspace skills",
        live: "workspace/skills",
        staged: "workspace_skills",
        kind: EntryKind::Dir,
        restore: RestoreMode::Merge,
        scrub: false,
        progress: LATE_STAGE,
    },
];

/// Names never copied into a snapshot from a scrubbed entry.
pub const SCRUBBED_NAMES: &[&str] = &[".git", "node_modules"];

/// Names never copied back onto a replaced entry.
pub const RESTORE_EXCLUDES: &[&str] = &[".git"];

impl ManifestEntry {
    /// Copy this entry from the live data root into a staging directory.
    pub fn stage(&self, data_root: &Path, staging_root: &Path) -> io::Result<CopyStats> {
        let source = data_root.join(self.live);
        let destination = staging_root.join(self.staged);

        match self.kind {
            EntryKind::File => copy_file(&source, &destination),
            EntryKind::Dir if self.scrub => {
                let root_name = data_root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mut exclude: Vec<&str> = SCRUBBED_NAMES.to_vec();
                if !root_name.is_empty() {
                    exclude.push(&root_name);
                }
                copy_tree(&source, &destination, &exclude)
            }
            EntryKind::Dir => copy_tree(&source, &destination, &[]),
        }
    }

    /// Whether the extracted snapshot carries this entry.
    pub fn present_in(&self, extracted_root: &Path) -> bool {
        extracted_root.join(self.staged).exists()
    }

    /// Write this entry from an extracted snapshot back onto the live data root.
    pub fn restore_into(&self, extracted_root: &Path, data_root: &Path) -> io::Result<CopyStats> {
        let source = extracted_root.join(self.staged);
        let destination = data_root.join(self.live);

        match (self.kind, self.restore) {
            (EntryKind::File, _) => copy_file(&source, &destination),
            (EntryKind::Dir, RestoreMode::Replace) => {
                if destination.exists() {
                    std::fs::remove_dir_all(&destination)?;
                }
                std::fs::create_dir_all(&destination)?;
                copy_tree(&source, &destination, RESTORE_EXCLUDES)
            }
            (EntryKind::Dir, RestoreMode::Merge) => copy_tree(&source, &destination, &[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_paths_are_unique() {
        let staged: HashSet<_> = MANIFEST.iter().map(|e| e.staged).collect();
        let live: HashSet<_> = MANIFEST.iter().map(|e| e.live).collect();
        assert_eq!(staged.len(), MANIFEST.len());
        assert_eq!(live.len(), MANIFEST.len());
    }

    #[test]
    fn test_manifest_progress_is_non_decreasing() {
        let progress: Vec<u8> = MANIFEST.iter().map(|e| e.progress).collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert!(progress.iter().all(|p| *p > 10 && *p < 100));
    }

    #[test]
    fn test_scrubbed_stage_skips_excluded_names() {
        let temp_dir = TempDir::new().unwrap();
        let data_root = temp_dir.path().join(".openclaw");
        let ws = data_root.join("workspace");
        fs::create_dir_all(ws.join(".git")).unwrap();
        fs::create_dir_all(ws.join("node_modules/x")).unwrap();
        fs::create_dir_all(ws.join(".openclaw")).unwrap();
        fs::write(ws.join(".openclaw/loop.txt"), b"x").unwrap();
        fs::write(ws.join("AGENTS.md"), b"agents").unwrap();

        let staging = temp_dir.path().join("staging");
        let workspace = MANIFEST.iter().find(|e| e.label == "workspace").unwrap();
        workspace.stage(&data_root, &staging).unwrap();

        assert!(staging.join("workspace/AGENTS.md").exists());
        assert!(!staging.join("workspace/.git").exists());
        assert!(!staging.join("workspace/node_modules").exists());
        assert!(!staging.join("workspace/.openclaw").exists());
    }

    #[test]
    fn test_replace_restore_removes_stale_files() {
        let temp_dir = TempDir::new().unwrap();
        let extracted = temp_dir.path().join("extracted");
        let data_root = temp_dir.path().join("live");
        fs::create_dir_all(extracted.join("workspace")).unwrap();
        fs::write(extracted.join("workspace/kept.md"), b"from snapshot").unwrap();
        fs::create_dir_all(data_root.join("workspace")).unwrap();
        fs::write(data_root.join("workspace/stale.md"), b"old").unwrap();

        let workspace = MANIFEST.iter().find(|e| e.label == "workspace").unwrap();
        workspace.restore_into(&extracted, &data_root).unwrap();

        assert!(!data_root.join("workspace/stale.md").exists());
        assert_eq!(
            fs::read(data_root.join("workspace/kept.md")).unwrap(),
            b"from snapshot"
        );
    }

    #[test]
    fn test_merge_restore_keeps_local_files() {
        let temp_dir = TempDir::new().unwrap();
        let extracted = temp_dir.path().join("extracted");
        let data_root = temp_dir.path().join("live");
        fs::create_dir_all(extracted.join("agents")).unwrap();
        fs::write(extracted.join("agents/main.json"), b"restored").unwrap();
        fs::create_dir_all(data_root.join("agents")).unwrap();
        fs::write(data_root.join("agents/local.json"), b"local").unwrap();

        let agents = MANIFEST.iter().find(|e| e.label == "agents").unwrap();
        assert!(agents.present_in(&extracted));
        agents.restore_into(&extracted, &data_root).unwrap();

        assert!(data_root.join("agents/local.json").exists());
        assert_eq!(fs::read(data_root.join("agents/main.json")).unwrap(), b"restored");
    }

    #[test]
    fn test_workspace_skills_map_to_nested_live_path() {
        let temp_dir = TempDir::new().unwrap();
        let data_root = temp_dir.path().join("live");
        fs::create_dir_all(data_root.join("workspace/skills/search")).unwrap();
        fs::write(data_root.join("workspace/skills/search/SKILL.md"), b"s").unwrap();

        let staging = temp_dir.path().join("staging");
        let entry = MANIFEST.iter().find(|e| e.staged == "workspace_skills").unwrap();
        entry.stage(&data_root, &staging).unwrap();

        assert!(staging.join("workspace_skills/search/SKILL.md").exists());
    }
}
