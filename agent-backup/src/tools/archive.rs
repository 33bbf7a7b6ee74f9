//! Archive codec: turns a staged directory into a single `.tar.gz` and back.

use super::run_tool;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

#[async_trait]
pub trait Archiver: Send + Sync {
    /// Pack `staging_dir` so that it is the archive's only top-level entry.
    async fn pack(&self, staging_dir: &Path, archive: &Path) -> Result<()>;

    /// Extract `archive` under `target_dir` and return its single top-level directory.
    async fn unpack(&self, archive: &Path, target_dir: &Path) -> Result<PathBuf>;
}

/// `Archiver` backed by the system `tar` binary (gzip compression).
pub struct TarArchiver {
    program: String,
    timeout: Duration,
}

impl TarArchiver {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Archiver for TarArchiver {
    async fn pack(&self, staging_dir: &Path, archive: &Path) -> Result<()> {
        let (parent, name) = split_staging(staging_dir)?;
        let args = vec![
            "-czf".to_string(),
            archive.to_string_lossy().into_owned(),
            "-C".to_string(),
            parent.to_string_lossy().into_owned(),
            name,
        ];
        run_tool(&self.program, &args, None, self.timeout).await?;
        Ok(())
    }

    async fn unpack(&self, archive: &Path, target_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(target_dir).await?;
        let args = vec![
            "-xzf".to_string(),
            archive.to_string_lossy().into_owned(),
            "-C".to_string(),
            target_dir.to_string_lossy().into_owned(),
        ];
        run_tool(&self.program, &args, None, self.timeout).await?;
        single_root(target_dir)
    }
}

/// Split a staging directory into `(parent, base name)` after checking it is a directory.
pub fn split_staging(staging_dir: &Path) -> Result<(PathBuf, String)> {
    if !staging_dir.is_dir() {
        return Err(EngineError::ArchiveFormat(format!(
            "staging path {} is not a directory",
            staging_dir.display()
        )));
    }
    let parent = staging_dir
        .parent()
        .ok_or_else(|| EngineError::ArchiveFormat("staging directory has no parent".into()))?;
    let name = staging_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| EngineError::ArchiveFormat("staging directory has no name".into()))?;
    Ok((parent.to_path_buf(), name))
}

/// Locate the single top-level directory of an extracted archive.
pub fn single_root(target_dir: &Path) -> Result<PathBuf> {
    let entries: Vec<PathBuf> = std::fs::read_dir(target_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();

    match entries.as_slice() {
        [only] if only.is_dir() => Ok(only.clone()),
        [only] => Err(EngineError::ArchiveFormat(format!(
            "top-level entry {} is not a directory",
            only.display()
        ))),
        [] => Err(EngineError::ArchiveFormat("archive is empty".into())),
        many => Err(EngineError::ArchiveFormat(format!(
            "expected one top-level entry, found {}",
            many.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_single_root_accepts_one_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("snap")).unwrap();
        assert_eq!(single_root(temp_dir.path()).unwrap(), temp_dir.path().join("snap"));
    }

    #[test]
    fn test_single_root_rejects_empty_and_multiple() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            single_root(temp_dir.path()),
            Err(EngineError::ArchiveFormat(_))
        ));

        fs::create_dir(temp_dir.path().join("a")).unwrap();
        fs::create_dir(temp_dir.path().join("b")).unwrap();
        assert!(matches!(
            single_root(temp_dir.path()),
            Err(EngineError::ArchiveFormat(_))
        ));
    }

    #[test]
    fn test_single_root_rejects_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("loose.txt"), b"x").unwrap();
        assert!(matches!(
            single_root(temp_dir.path()),
            Err(EngineError::ArchiveFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_tar_pack_and_unpack() {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("snapshot_1");
        fs::create_dir_all(staging.join("workspace")).unwrap();
        fs::write(staging.join("workspace/notes.md"), b"# notes").unwrap();

        let archive = temp_dir.path().join("snapshot_1.tar.gz");
        let tar = TarArchiver::new("tar", Duration::from_secs(30));
        tar.pack(&staging, &archive).await.unwrap();
        assert!(archive.is_file());

        let target = temp_dir.path().join("extract");
        let root = tar.unpack(&archive, &target).await.unwrap();
        assert_eq!(root, target.join("snapshot_1"));
        assert_eq!(fs::read(root.join("workspace/notes.md")).unwrap(), b"# notes");
    }

    #[tokio::test]
    async fn test_tar_unpack_corrupt_archive_fails() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("broken.tar.gz");
        fs::write(&archive, b"not an archive").unwrap();

        let tar = TarArchiver::new("tar", Duration::from_secs(30));
        let err = tar.unpack(&archive, &temp_dir.path().join("x")).await.unwrap_err();
        assert!(matches!(err, EngineError::ExternalTool { .. }));
    }

    #[tokio::test]
    async fn test_pack_rejects_missing_staging() {
        let temp_dir = TempDir::new().unwrap();
        let tar = TarArchiver::new("tar", Duration::from_secs(30));
        let err = tar
            .pack(&temp_dir.path().join("missing"), &temp_dir.path().join("a.tar.gz"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ArchiveFormat(_)));
    }
}
