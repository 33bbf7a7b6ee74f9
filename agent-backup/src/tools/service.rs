//! Post-restore system reconciliation: ownership fix-up and gateway service control.

use super::run_tool;
use crate::config::Config;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Recursively hand `root` back to the owning user.
    async fn fix_ownership(&self, root: &Path) -> Result<()>;

    /// (Re)install the dependent gateway service definition.
    async fn install_gateway(&self) -> Result<()>;

    /// Start the gateway, restarting it if it is already running.
    async fn restart_gateway(&self) -> Result<()>;
}

/// `ServiceManager` driving `chown`, the gateway installer and `systemctl`.
pub struct SystemdGateway {
    chown: String,
    systemctl: String,
    install_command: Vec<String>,
    unit: String,
    user_scope: bool,
    owner: Option<String>,
    timeout: Duration,
}

impl SystemdGateway {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chown: config.tools.chown.clone(),
            systemctl: config.tools.systemctl.clone(),
            install_command: config.gateway.install_command.clone(),
            unit: config.gateway.unit.clone(),
            user_scope: config.gateway.user_scope,
            owner: config.gateway.owner.clone(),
            timeout: config.tool_timeout(),
        }
    }

    fn owner(&self) -> Result<String> {
        if let Some(owner) = &self.owner {
            return Ok(owner.clone());
        }
        current_user()
    }
}

/// Name of the user this process runs as.
pub fn current_user() -> Result<String> {
    let uid = nix::unistd::Uid::current();
    match nix::unistd::User::from_uid(uid) {
        Ok(Some(user)) => Ok(user.name),
        Ok(None) => Err(EngineError::NotFound(format!("no passwd entry for uid {}", uid))),
        Err(e) => Err(EngineError::Io(std::io::Error::from(e))),
    }
}

#[async_trait]
impl ServiceManager for SystemdGateway {
    async fn fix_ownership(&self, root: &Path) -> Result<()> {
        let owner = self.owner()?;
        info!(%owner, root = %root.display(), "Fixing ownership");
        let args = vec![
            "-R".to_string(),
            format!("{owner}:{owner}"),
            root.to_string_lossy().into_owned(),
        ];
        run_tool(&self.chown, &args, None, self.timeout).await?;
        Ok(())
    }

    async fn install_gateway(&self) -> Result<()> {
        let (program, args) = self
            .install_command
            .split_first()
            .ok_or_else(|| EngineError::Validation("gateway install command is empty".into()))?;
        info!(%program, "Installing gateway service");
        run_tool(program, args, None, self.timeout).await?;
        Ok(())
    }

    async fn restart_gateway(&self) -> Result<()> {
        let mut args = Vec::new();
        if self.user_scope {
            args.push("--user".to_string());
        }
        args.push("restart".to_string());
        args.push(self.unit.clone());
        info!(unit = %self.unit, "Restarting gateway service");
        run_tool(&self.systemctl, &args, None, self.timeout).await?;
        Ok(())
    }
}
