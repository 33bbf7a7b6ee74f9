//! In-memory stand-ins for the external tools, and a wired-up engine on a scratch tree.

use crate::config::Config;
use crate::state::AppState;
use crate::tools::archive::single_root;
use crate::tools::{Archiver, SchedulerMirror, ServiceManager, TarArchiver};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use walkdir::WalkDir;

/// Keeps packed trees in scratch directories and writes a placeholder archive file.
#[derive(Default)]
pub struct FakeArchiver {
    packed: Mutex<HashMap<PathBuf, (TempDir, String)>>,
    fail_pack: AtomicBool,
    fail_unpack: AtomicBool,
    block_sidecar: AtomicBool,
    packs: AtomicUsize,
    held: AtomicBool,
    release: Notify,
}

impl FakeArchiver {
    pub fn fail_pack(&self, fail: bool) {
        self.fail_pack.store(fail, Ordering::SeqCst);
    }

    pub fn fail_unpack(&self, fail: bool) {
        self.fail_unpack.store(fail, Ordering::SeqCst);
    }

    /// Occupy the sidecar path of every packed archive with a directory.
    pub fn block_sidecar(&self, block: bool) {
        self.block_sidecar.store(block, Ordering::SeqCst);
    }

    pub fn pack_count(&self) -> usize {
        self.packs.load(Ordering::SeqCst)
    }

    /// Block unpacking until [`FakeArchiver::release_unpack`].
    pub fn hold_unpack(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release_unpack(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    /// Root of the tree packed into `archive`, if any.
    pub fn staged_tree(&self, archive: &Path) -> Option<PathBuf> {
        let packed = self.packed.lock().unwrap();
        packed.get(archive).map(|(dir, name)| dir.path().join(name))
    }
}

#[async_trait]
impl Archiver for FakeArchiver {
    async fn pack(&self, staging_dir: &Path, archive: &Path) -> Result<()> {
        self.packs.fetch_add(1, Ordering::SeqCst);
        if self.fail_pack.load(Ordering::SeqCst) {
            return Err(EngineError::tool_failure("tar", "exit code 2", "simulated pack failure"));
        }

        let name = staging_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let store = TempDir::new()?;
        crate::fs::copy_tree(staging_dir, &store.path().join(&name), &[])?;
        std::fs::write(archive, b"fake archive")?;
        if self.block_sidecar.load(Ordering::SeqCst) {
            std::fs::create_dir_all(archive.with_file_name(format!("{}.json", name)))?;
        }

        self.packed
            .lock()
            .unwrap()
            .insert(archive.to_path_buf(), (store, name));
        Ok(())
    }

    async fn unpack(&self, archive: &Path, target_dir: &Path) -> Result<PathBuf> {
        if self.held.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        if self.fail_unpack.load(Ordering::SeqCst) {
            return Err(EngineError::tool_failure("tar", "exit code 2", "simulated unpack failure"));
        }

        let (source, name) = {
            let packed = self.packed.lock().unwrap();
            let (dir, name) = packed
                .get(archive)
                .ok_or_else(|| EngineError::ArchiveFormat("unknown archive".into()))?;
            (dir.path().join(name), name.clone())
        };
        crate::fs::copy_tree(&source, &target_dir.join(name), &[])?;
        single_root(target_dir)
    }
}

/// Write an executable `crontab` stand-in into `dir`. `-l` runs `list_body`;
/// `-` saves stdin to `dir/saved`.
pub fn fake_crontab(dir: &Path, list_body: &str) -> String {
    let script = dir.join("crontab");
    let saved = dir.join("saved");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\ncase \"$1\" in\n  -l) {}\n  ;;\n  -) cat > '{}' ;;\nesac\n",
            list_body,
            saved.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script.to_string_lossy().into_owned()
}

/// Scheduler text held in memory.
#[derive(Default)]
pub struct FakeMirror {
    content: Mutex<String>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl FakeMirror {
    pub fn with_content(content: &str) -> Self {
        let mirror = Self::default();
        mirror.set_content(content);
        mirror
    }

    pub fn content(&self) -> String {
        self.content.lock().unwrap().clone()
    }

    pub fn set_content(&self, content: &str) {
        *self.content.lock().unwrap() = content.to_string();
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchedulerMirror for FakeMirror {
    async fn read(&self) -> Result<String> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(EngineError::tool_failure("crontab", "exit code 2", "simulated read failure"));
        }
        Ok(self.content())
    }

    async fn write(&self, content: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::tool_failure("crontab", "exit code 1", "simulated write failure"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.set_content(content);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCall {
    FixOwnership,
    Install,
    Restart,
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Records service calls and optionally fails one of them.
#[derive(Default)]
pub struct FakeServices {
    calls: Mutex<Vec<ServiceCall>>,
    fail_on: Mutex<Option<ServiceCall>>,
    hook: Mutex<Option<(ServiceCall, Hook)>>,
}

impl FakeServices {
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_on(&self, call: ServiceCall) {
        *self.fail_on.lock().unwrap() = Some(call);
    }

    /// Run `hook` whenever `call` succeeds.
    pub fn on_call(&self, call: ServiceCall, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some((call, Box::new(hook)));
    }

    fn record(&self, call: ServiceCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if *self.fail_on.lock().unwrap() == Some(call) {
            return Err(EngineError::tool_failure(
                &format!("{:?}", call),
                "exit code 1",
                "simulated service failure",
            ));
        }
        if let Some((target, hook)) = self.hook.lock().unwrap().as_ref() {
            if *target == call {
                hook();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceManager for FakeServices {
    async fn fix_ownership(&self, _root: &Path) -> Result<()> {
        self.record(ServiceCall::FixOwnership)
    }

    async fn install_gateway(&self) -> Result<()> {
        self.record(ServiceCall::Install)
    }

    async fn restart_gateway(&self) -> Result<()> {
        self.record(ServiceCall::Restart)
    }
}

/// A full engine over a scratch data root, with fakes for every external tool.
pub struct Harness {
    pub state: Arc<AppState>,
    pub archiver: Arc<FakeArchiver>,
    pub mirror: Arc<FakeMirror>,
    pub services: Arc<FakeServices>,
    _temp_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Same as [`Harness::new`] but archives go through the real `tar` binary.
    pub fn with_tar() -> Self {
        Self::build(Some(Arc::new(TarArchiver::new("tar", Duration::from_secs(60)))))
    }

    fn build(archiver_override: Option<Arc<dyn Archiver>>) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let data_root = temp_dir.path().join("openclaw");
        std::fs::create_dir_all(&data_root).unwrap();

        let archiver = Arc::new(FakeArchiver::default());
        let mirror = Arc::new(FakeMirror::default());
        let services = Arc::new(FakeServices::default());
        let active: Arc<dyn Archiver> = match archiver_override {
            Some(custom) => custom,
            None => archiver.clone() as Arc<dyn Archiver>,
        };

        let state = AppState::new(
            Config::for_data_root(&data_root),
            active,
            mirror.clone(),
            services.clone(),
        )
        .map(Arc::new)
        .unwrap();

        Self {
            state,
            archiver,
            mirror,
            services,
            _temp_dir: temp_dir,
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.state.layout.data_root
    }

    /// Populate a representative live tree.
    pub fn seed_live_tree(&self) {
        let root = self.data_root();
        let write = |rel: &str, body: &[u8]| {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        };

        write("openclaw.json", b"{\"gateway\":{\"port\":18789}}");
        write("workspace/AGENTS.md", b"# Agents\n");
        write("workspace/.git/HEAD", b"ref: refs/heads/main\n");
        write("workspace/node_modules/left-pad/index.js", b"module.exports = 1;\n");
        write("workspace/skills/search/SKILL.md", b"search skill\n");
        write("credentials/token.json", b"{\"token\":\"secret\"}");
        write("agents/main/agent.json", b"{\"name\":\"main\"}");
        write("telegram/offset.json", b"{\"offset\":42}");
        write("memory/notes.sqlite", &[0u8, 1, 2, 3, 255]);
    }

    /// Overwrite, remove and add files so a restore has something to undo.
    pub fn scramble_live_tree(&self) {
        let root = self.data_root();
        std::fs::write(root.join("openclaw.json"), b"scrambled").unwrap();
        std::fs::write(root.join("credentials/token.json"), b"scrambled").unwrap();
        let _ = std::fs::remove_file(root.join("workspace/AGENTS.md"));
        std::fs::write(root.join("workspace/stray.txt"), b"not in snapshot").unwrap();
    }

    /// File contents of the live tree keyed by relative path. Skips the
    /// backups directory and names never captured in a snapshot.
    pub fn snapshot_live_tree(&self) -> BTreeMap<String, Vec<u8>> {
        let root = self.data_root();
        let backups = &self.state.layout.backups_dir;
        WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                e.path() != backups.as_path() && name != ".git" && name != "node_modules"
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().into_owned();
                (rel, std::fs::read(e.path()).unwrap())
            })
            .collect()
    }

    /// Sorted file names directly inside the backups directory.
    pub fn backups_listing(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.state.layout.backups_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
