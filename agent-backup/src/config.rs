//! Configuration for the backup engine.
//!
//! Loads configuration from an optional TOML file, then applies environment
//! variable overrides (a `.env` file is honoured).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub tools: ToolsConfig,
    pub gateway: GatewayConfig,
    pub schedule: ScheduleConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP API on
    pub host: String,

    /// HTTP API port
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Live application state root (the directory that gets snapshotted)
    pub data_root: PathBuf,

    /// Snapshot root, defaults to `<data_root>/backups`
    pub backups_dir: Option<PathBuf>,

    /// Schedule store directory, defaults to `<data_root>/cron`
    pub cron_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub tar: String,
    pub crontab: String,
    pub chown: String,
    pub systemctl: String,

    /// Upper bound for any single external tool invocation
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Command (program followed by arguments) that installs the gateway service
    pub install_command: Vec<String>,

    /// systemd unit of the gateway
    pub unit: String,

    /// Talk to the per-user systemd instance
    pub user_scope: bool,

    /// Owner applied to the data root after a restore; defaults to the invoking user
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// File name of the backup invocation script; also the marker for owned scheduler lines
    pub script_name: String,

    /// Directories searched in order for the script. Relative entries resolve against the data root.
    pub script_dirs: Vec<PathBuf>,

    /// Output of scheduled runs, defaults to `<backups_dir>/backup.log`
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

fn default_data_root() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".openclaw")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3847,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            backups_dir: None,
            cron_dir: None,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            tar: "tar".to_string(),
            crontab: "crontab".to_string(),
            chown: "chown".to_string(),
            systemctl: "systemctl".to_string(),
            timeout_secs: 600,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            install_command: vec![
                "openclaw".to_string(),
                "gateway".to_string(),
                "install".to_string(),
            ],
            unit: "openclaw-gateway.service".to_string(),
            user_scope: true,
            owner: None,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            script_name: "openclaw-backup.sh".to_string(),
            script_dirs: vec![
                PathBuf::from("workspace/scripts"),
                PathBuf::from("scripts"),
                PathBuf::from("/usr/local/bin"),
            ],
            log_file: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from an optional file and apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Configuration rooted at an explicit data directory, everything else default.
    pub fn for_data_root(data_root: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.paths.data_root = data_root.into();
        config
    }

    fn apply_env(&mut self) {
        if let Some(root) = std::env::var_os("OPENCLAW_HOME") {
            self.paths.data_root = PathBuf::from(root);
        }
        if let Some(dir) = std::env::var_os("BACKUP_DIR") {
            self.paths.backups_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = std::env::var_os("CRON_DIR") {
            self.paths.cron_dir = Some(PathBuf::from(dir));
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.log.level = level;
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.timeout_secs)
    }

    pub fn layout(&self) -> Layout {
        let data_root = self.paths.data_root.clone();
        let backups_dir = self
            .paths
            .backups_dir
            .clone()
            .unwrap_or_else(|| data_root.join("backups"));
        let cron_dir = self
            .paths
            .cron_dir
            .clone()
            .unwrap_or_else(|| data_root.join("cron"));
        let log_file = self
            .schedule
            .log_file
            .clone()
            .unwrap_or_else(|| backups_dir.join("backup.log"));

        Layout {
            data_root,
            backups_dir,
            cron_dir,
            log_file,
        }
    }
}

/// Resolved on-disk locations, computed once at startup.
#[derive(Debug, Clone)]
pub struct Layout {
    pub data_root: PathBuf,
    pub backups_dir: PathBuf,
    pub cron_dir: PathBuf,
    pub log_file: PathBuf,
}

impl Layout {
    pub fn retention_file(&self) -> PathBuf {
        self.backups_dir.join("config.json")
    }

    pub fn schedule_file(&self) -> PathBuf {
        self.cron_dir.join("backup.json")
    }
}
